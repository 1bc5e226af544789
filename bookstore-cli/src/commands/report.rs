use super::{print_documents, print_json};
use crate::client::open_catalog;
use anyhow::{Context, Result};
use bookstore_core::catalog::{CatalogClient, DocumentStore, FindOptions};
use bookstore_core::config::CatalogConfig;
use bookstore_core::monitoring::SlowQueryLogger;
use clap::Args;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct ReportArgs {
    /// Seed file (JSON array of books)
    #[arg(long)]
    pub seed: PathBuf,

    /// Book whose price is updated
    #[arg(long, default_value = "The Great Gatsby")]
    pub update_title: String,

    /// Book that is deleted
    #[arg(long, default_value = "Gone Girl")]
    pub delete_title: String,

    /// Page size for the pagination section
    #[arg(long, default_value_t = 5)]
    pub page_size: u64,
}

pub fn execute_report(
    config: &CatalogConfig,
    slow_queries: Arc<SlowQueryLogger>,
    args: ReportArgs,
) -> Result<()> {
    let catalog = open_catalog(config, slow_queries.clone(), &args.seed)?;

    crud_section(&catalog, &args)?;
    advanced_query_section(&catalog, args.page_size)?;
    aggregation_section(&catalog)?;
    indexing_section(&catalog)?;

    let stats = slow_queries.get_stats();
    if stats.total_count > 0 {
        println!("\nSlow queries: {} (max {} ms)", stats.total_count, stats.max_duration_ms);
    }
    Ok(())
}

fn header(title: &str) {
    println!("\n=== {} ===\n", title);
}

fn show<S: DocumentStore>(
    catalog: &CatalogClient<S>,
    label: &str,
    options: FindOptions,
) -> Result<()> {
    println!("{}", label);
    let documents = catalog
        .find_documents(&options)?
        .try_collect()
        .with_context(|| format!("Query failed: {}", label))?;
    print_documents(documents)?;
    Ok(())
}

fn crud_section<S: DocumentStore>(catalog: &CatalogClient<S>, args: &ReportArgs) -> Result<()> {
    header("BASIC CRUD OPERATIONS");

    show(catalog, "1. Books in Fiction genre:", FindOptions::new(json!({"genre": "Fiction"})))?;
    show(
        catalog,
        "\n2. Books published after 2000:",
        FindOptions::new(json!({"published_year": {"$gt": 2000}})),
    )?;
    show(
        catalog,
        "\n3. Books by J.R.R. Tolkien:",
        FindOptions::new(json!({"author": "J.R.R. Tolkien"})),
    )?;

    println!("\n4. Updating price of '{}':", args.update_title);
    let title_filter = json!({"title": args.update_title});
    let update = catalog.update_one(&title_filter, &json!({"$set": {"price": 15.99}}))?;
    print_json(&update)?;
    match catalog.find_one(&title_filter)? {
        Some(book) => print_json(&book)?,
        None => println!("'{}' not found", args.update_title),
    }

    println!("\n5. Deleting '{}':", args.delete_title);
    let delete = catalog.delete_one(&json!({"title": args.delete_title}))?;
    print_json(&delete)
}

fn advanced_query_section<S: DocumentStore>(
    catalog: &CatalogClient<S>,
    page_size: u64,
) -> Result<()> {
    header("ADVANCED QUERIES");

    show(
        catalog,
        "1. Books in stock and published after 2010:",
        FindOptions::new(json!({"$and": [{"in_stock": true}, {"published_year": {"$gt": 2010}}]})),
    )?;

    let summary = json!({"title": 1, "author": 1, "price": 1, "_id": 0});
    let prices = json!({"title": 1, "price": 1, "_id": 0});

    show(
        catalog,
        "\n2. Books with projection (title, author, price only):",
        FindOptions::new(json!({})).projection(summary.clone()),
    )?;
    show(
        catalog,
        "\n3. Books sorted by price (ascending):",
        FindOptions::new(json!({})).projection(prices.clone()).sort(json!({"price": 1})),
    )?;
    show(
        catalog,
        "\n4. Books sorted by price (descending):",
        FindOptions::new(json!({})).projection(prices).sort(json!({"price": -1})),
    )?;
    show(
        catalog,
        &format!("\n5. Pagination - Page 1 (first {} books):", page_size),
        FindOptions::new(json!({})).projection(summary.clone()).limit(page_size),
    )?;
    show(
        catalog,
        &format!("\n6. Pagination - Page 2 (next {} books):", page_size),
        FindOptions::new(json!({})).projection(summary).skip(page_size).limit(page_size),
    )
}

fn run_pipeline<S: DocumentStore>(
    catalog: &CatalogClient<S>,
    label: &str,
    pipeline: Value,
) -> Result<()> {
    println!("{}", label);
    let results = catalog
        .aggregate(&pipeline)?
        .try_collect()
        .with_context(|| format!("Pipeline failed: {}", label))?;
    print_documents(results)?;
    Ok(())
}

fn aggregation_section<S: DocumentStore>(catalog: &CatalogClient<S>) -> Result<()> {
    header("AGGREGATION PIPELINES");

    run_pipeline(
        catalog,
        "1. Average price by genre:",
        json!([
            {"$group": {"_id": "$genre", "averagePrice": {"$avg": "$price"}, "bookCount": {"$sum": 1}}},
            {"$sort": {"averagePrice": -1}}
        ]),
    )?;
    run_pipeline(
        catalog,
        "\n2. Authors with book counts:",
        json!([
            {"$group": {"_id": "$author", "bookCount": {"$sum": 1}, "books": {"$push": "$title"}}},
            {"$sort": {"bookCount": -1}}
        ]),
    )?;
    run_pipeline(
        catalog,
        "\n3. Books by publication decade:",
        json!([
            {"$addFields": {"decade": {"$multiply": [{"$floor": {"$divide": ["$published_year", 10]}}, 10]}}},
            {"$group": {
                "_id": "$decade",
                "bookCount": {"$sum": 1},
                "books": {"$push": {"title": "$title", "year": "$published_year"}}
            }},
            {"$sort": {"_id": 1}}
        ]),
    )
}

fn indexing_section<S: DocumentStore>(catalog: &CatalogClient<S>) -> Result<()> {
    header("INDEXING");

    println!("1. Creating index on 'title' field:");
    println!("{}", catalog.create_index(&json!({"title": 1}))?);

    println!("\n2. Creating compound index on 'author' and 'published_year':");
    println!("{}", catalog.create_index(&json!({"author": 1, "published_year": -1}))?);

    println!("\n3. All indexes on books collection:");
    for index in catalog.list_indexes()? {
        print_json(&index)?;
    }

    println!("\n4. Query performance analysis:");
    let cases = [
        ("Query without using index (genre field - no index):", json!({"genre": "Fiction"})),
        ("Query using title index:", json!({"title": "The Great Gatsby"})),
        (
            "Query using compound index (author + published_year):",
            json!({"author": "J.R.R. Tolkien", "published_year": {"$gte": 1950}}),
        ),
    ];
    for (label, filter) in cases {
        println!("\n{}", label);
        print_json(&catalog.explain(&filter)?)?;
    }
    Ok(())
}

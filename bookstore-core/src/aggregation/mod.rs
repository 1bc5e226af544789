//! Aggregation pipeline
//!
//! Provides document-store style aggregation with pipeline stages:
//! - $match: Filter documents
//! - $group: Group and aggregate
//! - $project / $addFields ($set): Select, compute and reshape fields
//! - $sort / $skip / $limit: Order and page results
//! - $unwind: Expand array fields
//! - $count: Count the documents reaching the stage

pub mod accumulator;
pub mod expression;

pub use accumulator::{Accumulator, AccumulatorKind, AccumulatorState};
pub use expression::{ExprOp, Expression};

use crate::document::{Document, Value, ID_FIELD};
use crate::index::KeyValue;
use crate::query::{Filter, QueryExecutionError, QueryExecutor, QueryParseError, QueryParser, Sort};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Pipeline stage in aggregation
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Match(Filter),
    Group {
        id: Expression,
        fields: Vec<(String, Accumulator)>,
    },
    Project(ProjectSpec),
    AddFields(Vec<(String, Expression)>),
    Sort(Sort),
    Skip(u64),
    Limit(u64),
    Count(String),
    Unwind {
        path: String,
        preserve_null_and_empty: bool,
        include_array_index: Option<String>,
    },
}

impl PipelineStage {
    /// Stage operator name
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Match(_) => "$match",
            PipelineStage::Group { .. } => "$group",
            PipelineStage::Project(_) => "$project",
            PipelineStage::AddFields(_) => "$addFields",
            PipelineStage::Sort(_) => "$sort",
            PipelineStage::Skip(_) => "$skip",
            PipelineStage::Limit(_) => "$limit",
            PipelineStage::Count(_) => "$count",
            PipelineStage::Unwind { .. } => "$unwind",
        }
    }

    /// Parse a single `{"$stage": spec}` object
    pub fn parse(value: &JsonValue) -> Result<Self, AggregationError> {
        let obj = value
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| {
                AggregationError::InvalidPipeline(
                    "each stage must be an object with exactly one operator".to_string(),
                )
            })?;
        let (name, spec) = obj.iter().next().ok_or_else(|| {
            AggregationError::InvalidPipeline("empty stage".to_string())
        })?;

        match name.as_str() {
            "$match" => Ok(PipelineStage::Match(QueryParser::parse_filter(spec)?)),
            "$group" => Self::parse_group(spec),
            "$project" => Ok(PipelineStage::Project(ProjectSpec::parse(spec)?)),
            "$addFields" | "$set" => Self::parse_add_fields(name, spec),
            "$sort" => {
                let sort = QueryParser::parse_sort(spec)?;
                if sort.is_empty() {
                    return Err(AggregationError::InvalidStage(
                        "$sort requires at least one field".to_string(),
                    ));
                }
                Ok(PipelineStage::Sort(sort))
            }
            "$skip" => Ok(PipelineStage::Skip(Self::parse_count(name, spec, false)?)),
            "$limit" => Ok(PipelineStage::Limit(Self::parse_count(name, spec, true)?)),
            "$count" => {
                let field = spec.as_str().unwrap_or_default();
                if field.is_empty() || field.starts_with('$') || field.contains('.') {
                    return Err(AggregationError::InvalidStage(
                        "$count requires a non-empty field name without '$' or '.'".to_string(),
                    ));
                }
                Ok(PipelineStage::Count(field.to_string()))
            }
            "$unwind" => Self::parse_unwind(spec),
            other => Err(AggregationError::UnsupportedStage(other.to_string())),
        }
    }

    fn parse_group(spec: &JsonValue) -> Result<Self, AggregationError> {
        let obj = spec.as_object().ok_or_else(|| {
            AggregationError::InvalidStage("$group requires an object".to_string())
        })?;

        let id = obj.get(ID_FIELD).ok_or_else(|| {
            AggregationError::InvalidStage("$group requires an _id expression".to_string())
        })?;

        let mut fields = Vec::new();
        for (field, acc) in obj {
            if field == ID_FIELD {
                continue;
            }
            if field.starts_with('$') || field.contains('.') {
                return Err(AggregationError::InvalidStage(format!(
                    "invalid $group output field '{}'",
                    field
                )));
            }
            fields.push((field.clone(), Accumulator::parse(field, acc)?));
        }

        Ok(PipelineStage::Group {
            id: Expression::parse(id)?,
            fields,
        })
    }

    fn parse_add_fields(name: &str, spec: &JsonValue) -> Result<Self, AggregationError> {
        let obj = spec.as_object().filter(|o| !o.is_empty()).ok_or_else(|| {
            AggregationError::InvalidStage(format!("{} requires a non-empty object", name))
        })?;

        let mut fields = Vec::new();
        for (field, expr) in obj {
            if field.starts_with('$') {
                return Err(AggregationError::InvalidStage(format!(
                    "{} cannot set '{}'",
                    name, field
                )));
            }
            fields.push((field.clone(), Expression::parse(expr)?));
        }
        Ok(PipelineStage::AddFields(fields))
    }

    fn parse_count(name: &str, spec: &JsonValue, positive: bool) -> Result<u64, AggregationError> {
        let n = spec
            .as_u64()
            .or_else(|| spec.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| {
                AggregationError::InvalidStage(format!("{} requires a non-negative integer", name))
            })?;
        if positive && n == 0 {
            return Err(AggregationError::InvalidStage(format!(
                "{} must be positive",
                name
            )));
        }
        Ok(n)
    }

    fn parse_unwind(spec: &JsonValue) -> Result<Self, AggregationError> {
        let (path, preserve, index) = match spec {
            JsonValue::String(path) => (path.as_str(), false, None),
            JsonValue::Object(obj) => {
                let path = obj.get("path").and_then(JsonValue::as_str).unwrap_or_default();
                let preserve = obj
                    .get("preserveNullAndEmptyArrays")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false);
                let index = obj
                    .get("includeArrayIndex")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string);
                (path, preserve, index)
            }
            _ => ("", false, None),
        };

        let field = path.strip_prefix('$').filter(|p| !p.is_empty()).ok_or_else(|| {
            AggregationError::InvalidStage("$unwind path must be a '$field' string".to_string())
        })?;

        Ok(PipelineStage::Unwind {
            path: field.to_string(),
            preserve_null_and_empty: preserve,
            include_array_index: index,
        })
    }
}

/// `$project` specification
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSpec {
    /// Paths kept (inclusion mode) or dropped (exclusion mode)
    pub paths: Vec<String>,
    pub exclusion: bool,
    pub include_id: bool,
    /// Computed fields, inclusion mode only
    pub computed: Vec<(String, Expression)>,
}

impl ProjectSpec {
    /// Parse `{field: 0|1|true|false|expression}`
    pub fn parse(spec: &JsonValue) -> Result<Self, AggregationError> {
        let obj = spec.as_object().filter(|o| !o.is_empty()).ok_or_else(|| {
            AggregationError::InvalidStage("$project requires a non-empty object".to_string())
        })?;

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut computed = Vec::new();
        let mut include_id = true;

        for (field, value) in obj {
            let flag = match value {
                JsonValue::Bool(b) => Some(*b),
                JsonValue::Number(n) => Some(n.as_f64() != Some(0.0)),
                _ => None,
            };

            match flag {
                Some(keep) if field == ID_FIELD => include_id = keep,
                Some(true) => included.push(field.clone()),
                Some(false) => excluded.push(field.clone()),
                None => computed.push((field.clone(), Expression::parse(value)?)),
            }
        }

        if !excluded.is_empty() && (!included.is_empty() || !computed.is_empty()) {
            return Err(AggregationError::InvalidStage(
                "$project cannot mix inclusion and exclusion".to_string(),
            ));
        }

        let exclusion = !excluded.is_empty() || (included.is_empty() && computed.is_empty());
        Ok(Self {
            paths: if exclusion { excluded } else { included },
            exclusion,
            include_id,
            computed,
        })
    }

    /// Apply to one document
    pub fn apply(&self, doc: &Document) -> Result<Document, AggregationError> {
        if self.exclusion {
            let mut out = doc.clone();
            for path in &self.paths {
                out.remove_by_path(path);
            }
            if !self.include_id {
                out.remove(ID_FIELD);
            }
            return Ok(out);
        }

        let mut out = Document::new();
        if self.include_id {
            if let Some(id) = doc.get(ID_FIELD) {
                out.insert(ID_FIELD, id.clone());
            }
        }
        for path in &self.paths {
            if let Some(value) = doc.get_by_path(path) {
                out.set_by_path(path, value.clone())?;
            }
        }
        for (field, expr) in &self.computed {
            if let Some(value) = expr.evaluate(doc)? {
                out.set_by_path(field, value)?;
            }
        }
        Ok(out)
    }
}

/// Aggregation pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<PipelineStage>,
}

impl Pipeline {
    /// Create a pipeline from stages
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    /// Parse a JSON array of stages
    pub fn parse(value: &JsonValue) -> Result<Self, AggregationError> {
        let stages = value.as_array().ok_or_else(|| {
            AggregationError::InvalidPipeline("pipeline must be an array of stages".to_string())
        })?;

        Ok(Self {
            stages: stages
                .iter()
                .map(PipelineStage::parse)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Parse a pipeline from a JSON string
    pub fn parse_str(json: &str) -> Result<Self, AggregationError> {
        let value: JsonValue = serde_json::from_str(json)
            .map_err(|e| AggregationError::InvalidPipeline(e.to_string()))?;
        Self::parse(&value)
    }

    /// Filter of a leading `$match`, usable to pre-select input documents
    pub fn leading_match(&self) -> Option<&Filter> {
        match self.stages.first() {
            Some(PipelineStage::Match(filter)) => Some(filter),
            _ => None,
        }
    }

    /// Run all stages over the input documents
    pub fn execute(&self, documents: Vec<Document>) -> Result<Vec<Document>, AggregationError> {
        let executor = QueryExecutor::new();
        let mut docs = documents;

        for stage in &self.stages {
            docs = Self::execute_stage(&executor, stage, docs)?;
        }

        Ok(docs)
    }

    fn execute_stage(
        executor: &QueryExecutor,
        stage: &PipelineStage,
        docs: Vec<Document>,
    ) -> Result<Vec<Document>, AggregationError> {
        match stage {
            PipelineStage::Match(filter) => {
                let mut out = Vec::new();
                for doc in docs {
                    if executor.matches_filter(&doc, filter)? {
                        out.push(doc);
                    }
                }
                Ok(out)
            }

            PipelineStage::Group { id, fields } => Self::group(docs, id, fields),

            PipelineStage::Project(spec) => docs.iter().map(|d| spec.apply(d)).collect(),

            PipelineStage::AddFields(fields) => docs
                .into_iter()
                .map(|doc| {
                    let mut out = doc.clone();
                    for (field, expr) in fields {
                        if let Some(value) = expr.evaluate(&doc)? {
                            out.set_by_path(field, value)?;
                        }
                    }
                    Ok::<_, AggregationError>(out)
                })
                .collect(),

            PipelineStage::Sort(sort) => {
                let mut docs = docs;
                QueryExecutor::apply_sort(&mut docs, sort);
                Ok(docs)
            }

            PipelineStage::Skip(n) => Ok(docs.into_iter().skip(*n as usize).collect()),

            PipelineStage::Limit(n) => Ok(docs.into_iter().take(*n as usize).collect()),

            PipelineStage::Count(field) => {
                if docs.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out = Document::new();
                out.insert(field.clone(), Value::Int64(docs.len() as i64));
                Ok(vec![out])
            }

            PipelineStage::Unwind {
                path,
                preserve_null_and_empty,
                include_array_index,
            } => {
                let mut out = Vec::new();
                for doc in docs {
                    match doc.get_by_path(path).cloned() {
                        Some(Value::Array(items)) if !items.is_empty() => {
                            for (i, item) in items.into_iter().enumerate() {
                                let mut unwound = doc.clone();
                                unwound.set_by_path(path, item)?;
                                if let Some(index_field) = include_array_index {
                                    unwound.set_by_path(index_field, Value::Int64(i as i64))?;
                                }
                                out.push(unwound);
                            }
                        }
                        Some(Value::Array(_)) | Some(Value::Null) | None => {
                            if *preserve_null_and_empty {
                                let mut kept = doc;
                                if let Some(index_field) = include_array_index {
                                    kept.set_by_path(index_field, Value::Null)?;
                                }
                                out.push(kept);
                            }
                        }
                        Some(_) => {
                            // scalars unwind to themselves
                            let mut kept = doc;
                            if let Some(index_field) = include_array_index {
                                kept.set_by_path(index_field, Value::Null)?;
                            }
                            out.push(kept);
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Group documents by key, keeping first-seen group order
    fn group(
        docs: Vec<Document>,
        id: &Expression,
        fields: &[(String, Accumulator)],
    ) -> Result<Vec<Document>, AggregationError> {
        let mut positions: BTreeMap<KeyValue, usize> = BTreeMap::new();
        let mut groups: Vec<(Value, Vec<AccumulatorState>)> = Vec::new();

        for doc in &docs {
            let key = id.evaluate_or_null(doc)?;
            let pos = match positions.get(&KeyValue(key.clone())) {
                Some(pos) => *pos,
                None => {
                    groups.push((key.clone(), fields.iter().map(|(_, acc)| acc.start()).collect()));
                    positions.insert(KeyValue(key), groups.len() - 1);
                    groups.len() - 1
                }
            };

            let states = &mut groups[pos].1;
            for ((_, acc), state) in fields.iter().zip(states.iter_mut()) {
                acc.accumulate(state, doc)?;
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, states)| {
                let mut out = Document::new();
                out.insert(ID_FIELD, key);
                for ((field, _), state) in fields.iter().zip(states) {
                    out.insert(field.clone(), state.finish());
                }
                out
            })
            .collect())
    }
}

/// Aggregation errors
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Unsupported stage: {0}")]
    UnsupportedStage(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Division by zero in {0}")]
    DivisionByZero(String),

    #[error(transparent)]
    Parse(#[from] QueryParseError),

    #[error(transparent)]
    Execution(#[from] QueryExecutionError),

    #[error("Document error: {0}")]
    Document(#[from] crate::document::DocumentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn books() -> Vec<Document> {
        [
            json!({"title": "1984", "genre": "Dystopian", "price": 8.99, "published_year": 1949, "tags": ["classic", "politics"]}),
            json!({"title": "Dune", "genre": "Science Fiction", "price": 9.99, "published_year": 1965, "tags": []}),
            json!({"title": "Brave New World", "genre": "Dystopian", "price": 7.5, "published_year": 1932}),
            json!({"title": "The Hobbit", "genre": "Fantasy", "price": 11.0, "published_year": 1937, "tags": ["classic"]}),
        ]
        .iter()
        .map(|j| Document::from_json_value(j).unwrap())
        .collect()
    }

    fn run(pipeline: serde_json::Value) -> Vec<Document> {
        Pipeline::parse(&pipeline).unwrap().execute(books()).unwrap()
    }

    #[test]
    fn test_group_counts_in_first_seen_order() {
        let out = run(json!([{"$group": {"_id": "$genre", "count": {"$sum": 1}}}]));
        let genres: Vec<_> = out.iter().map(|d| d.get("_id").cloned().unwrap()).collect();
        assert_eq!(
            genres,
            vec![Value::from("Dystopian"), Value::from("Science Fiction"), Value::from("Fantasy")]
        );
        assert_eq!(out[0].get("count"), Some(&Value::Int32(2)));
    }

    #[test]
    fn test_group_then_sort_by_count() {
        let out = run(json!([
            {"$group": {"_id": "$genre", "count": {"$sum": 1}, "avg_price": {"$avg": "$price"}}},
            {"$sort": {"count": -1, "_id": 1}}
        ]));
        assert_eq!(out[0].get("_id"), Some(&Value::from("Dystopian")));
        assert_eq!(out[1].get("_id"), Some(&Value::from("Fantasy")));
        assert_eq!(out[0].get("avg_price"), Some(&Value::Float64((8.99 + 7.5) / 2.0)));
    }

    #[test]
    fn test_group_null_id_aggregates_everything() {
        let out = run(json!([{"$group": {"_id": null, "total": {"$sum": "$published_year"}}}]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("_id"), Some(&Value::Null));
        assert_eq!(out[0].get("total"), Some(&Value::Int32(1949 + 1965 + 1932 + 1937)));
    }

    #[test]
    fn test_match_project_sort_limit() {
        let out = run(json!([
            {"$match": {"published_year": {"$lt": 1950}}},
            {"$project": {"_id": 0, "title": 1, "decade": {"$multiply": [{"$floor": {"$divide": ["$published_year", 10]}}, 10]}}},
            {"$sort": {"title": 1}},
            {"$limit": 2}
        ]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("title"), Some(&Value::from("1984")));
        assert_eq!(out[0].get("decade"), Some(&Value::Float64(1940.0)));
        assert!(!out[0].contains_key("price"));
    }

    #[test]
    fn test_add_fields_and_count() {
        let out = run(json!([
            {"$addFields": {"discounted": {"$multiply": ["$price", 0.5]}}},
            {"$match": {"discounted": {"$lt": 5}}},
            {"$count": "cheap"}
        ]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("cheap"), Some(&Value::Int64(3)));

        assert!(run(json!([{"$match": {"price": {"$gt": 100}}}, {"$count": "n"}])).is_empty());
    }

    #[test]
    fn test_add_fields_can_replace_id() {
        let out = run(json!([
            {"$set": {"_id": 7}},
            {"$addFields": {"_id": "$title", "decade": {"$literal": 1940}}},
            {"$limit": 1}
        ]));
        assert_eq!(out[0].get("_id"), Some(&Value::from("1984")));
        assert_eq!(out[0].get("decade"), Some(&Value::Int32(1940)));
    }

    #[test]
    fn test_unwind() {
        let out = run(json!([{"$unwind": "$tags"}]));
        assert_eq!(out.len(), 3);

        let preserved = run(json!([
            {"$unwind": {"path": "$tags", "preserveNullAndEmptyArrays": true}}
        ]));
        assert_eq!(preserved.len(), 5);
    }

    #[test]
    fn test_skip_and_exclusion_project() {
        let out = run(json!([{"$skip": 3}, {"$project": {"tags": 0, "price": 0}}]));
        assert_eq!(out.len(), 1);
        assert!(out[0].contains_key("title"));
        assert!(!out[0].contains_key("tags"));
    }

    #[test]
    fn test_invalid_pipelines() {
        assert!(Pipeline::parse(&json!({"$match": {}})).is_err());
        assert!(Pipeline::parse(&json!([{"$lookup": {}}])).is_err());
        assert!(Pipeline::parse(&json!([{"$match": {}, "$limit": 1}])).is_err());
        assert!(Pipeline::parse(&json!([{"$limit": 0}])).is_err());
        assert!(Pipeline::parse(&json!([{"$group": {"count": {"$sum": 1}}}])).is_err());
        assert!(Pipeline::parse(&json!([{"$project": {"title": 1, "price": 0}}])).is_err());
        assert!(Pipeline::parse(&json!([{"$count": "$n"}])).is_err());
    }

    #[test]
    fn test_divide_by_zero_surfaces() {
        let spec = json!([{"$project": {"x": {"$divide": ["$price", 0]}}}]);
        let pipeline = Pipeline::parse(&spec).unwrap();
        assert!(matches!(
            pipeline.execute(books()),
            Err(AggregationError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_leading_match() {
        let spec = json!([{"$match": {"genre": "Fantasy"}}, {"$limit": 1}]);
        let pipeline = Pipeline::parse(&spec).unwrap();
        assert!(pipeline.leading_match().is_some());
        let pipeline = Pipeline::parse(&json!([{"$limit": 1}])).unwrap();
        assert!(pipeline.leading_match().is_none());
    }
}

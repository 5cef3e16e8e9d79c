//! Query DSL builders. Each leaf serializes to the single-key object shape the engine expects,
//! e.g. `{"term": {"_id": {"value": "sku-1"}}}`.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Serializes as `{key: value}`.
struct Keyed<'a, T: ?Sized>(&'a str, &'a T);

impl<T: Serialize + ?Sized> Serialize for Keyed<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0, self.1)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term(TermQuery),
    Match(MatchQuery),
    Range(RangeQuery),
    Bool(BoolQuery),
}

impl Query {
    /// Exact-value match on a keyword field.
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term(TermQuery {
            field: field.into(),
            value: value.into(),
            boost: None,
            case_insensitive: None,
        })
    }

    /// Full-text match on an analyzed field.
    pub fn matching(field: impl Into<String>, query: impl Into<String>) -> Self {
        Query::Match(MatchQuery {
            field: field.into(),
            query: query.into(),
            operator: None,
        })
    }

    pub fn range(field: impl Into<String>) -> RangeQuery {
        RangeQuery {
            field: field.into(),
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        }
    }

    pub fn bool() -> BoolQuery {
        BoolQuery::default()
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Query::Term(q) => q.serialize(serializer),
            Query::Match(q) => q.serialize(serializer),
            Query::Range(q) => q.serialize(serializer),
            Query::Bool(q) => Keyed("bool", q).serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    pub field: String,
    pub value: String,
    pub boost: Option<f32>,
    pub case_insensitive: Option<bool>,
}

impl TermQuery {
    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = Some(boost);
        self
    }

    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = Some(case_insensitive);
        self
    }
}

#[derive(Serialize)]
struct TermBody<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    boost: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    case_insensitive: Option<bool>,
}

impl Serialize for TermQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = TermBody {
            value: &self.value,
            boost: self.boost,
            case_insensitive: self.case_insensitive,
        };
        Keyed("term", &Keyed(&self.field, &body)).serialize(serializer)
    }
}

impl From<TermQuery> for Query {
    fn from(value: TermQuery) -> Self {
        Query::Term(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub field: String,
    pub query: String,
    /// `and` / `or`, engine default when unset.
    pub operator: Option<String>,
}

#[derive(Serialize)]
struct MatchBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    operator: Option<&'a str>,
}

impl Serialize for MatchQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = MatchBody {
            query: &self.query,
            operator: self.operator.as_deref(),
        };
        Keyed("match", &Keyed(&self.field, &body)).serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub field: String,
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

impl RangeQuery {
    pub fn gt(mut self, value: impl Into<Value>) -> Self {
        self.gt = Some(value.into());
        self
    }

    pub fn gte(mut self, value: impl Into<Value>) -> Self {
        self.gte = Some(value.into());
        self
    }

    pub fn lt(mut self, value: impl Into<Value>) -> Self {
        self.lt = Some(value.into());
        self
    }

    pub fn lte(mut self, value: impl Into<Value>) -> Self {
        self.lte = Some(value.into());
        self
    }
}

#[derive(Serialize)]
struct RangeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    gt: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gte: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lt: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lte: Option<&'a Value>,
}

impl Serialize for RangeQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = RangeBody {
            gt: self.gt.as_ref(),
            gte: self.gte.as_ref(),
            lt: self.lt.as_ref(),
            lte: self.lte.as_ref(),
        };
        Keyed("range", &Keyed(&self.field, &body)).serialize(serializer)
    }
}

impl From<RangeQuery> for Query {
    fn from(value: RangeQuery) -> Self {
        Query::Range(value)
    }
}

/// Compound query. Empty clause lists are left out of the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoolQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Query>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Query>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Query>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Query>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
}

impl BoolQuery {
    pub fn must(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.must.extend(queries);
        self
    }

    pub fn must_not(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.must_not.extend(queries);
        self
    }

    pub fn should(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.should.extend(queries);
        self
    }

    pub fn filter(mut self, queries: impl IntoIterator<Item = Query>) -> Self {
        self.filter.extend(queries);
        self
    }

    pub fn minimum_should_match(mut self, minimum: u32) -> Self {
        self.minimum_should_match = Some(minimum);
        self
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = Some(boost);
        self
    }
}

impl From<BoolQuery> for Query {
    fn from(value: BoolQuery) -> Self {
        Query::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_term_query() {
        let query = Query::term("_id", "sku-1");
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"term": {"_id": {"value": "sku-1"}}})
        );

        let Query::Term(term) = query else {
            panic!("expected a term query");
        };
        let query: Query = term.boost(2.0).case_insensitive(true).into();
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"term": {"_id": {"value": "sku-1", "boost": 2.0, "case_insensitive": true}}})
        );
    }

    #[test]
    fn test_bool_should_of_terms() {
        let query: Query = Query::bool()
            .should(["a", "b"].into_iter().map(|id| Query::term("_id", id)))
            .into();

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "bool": {
                    "should": [
                        {"term": {"_id": {"value": "a"}}},
                        {"term": {"_id": {"value": "b"}}}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_nested_bool_with_range_and_match() {
        let query: Query = Query::bool()
            .must([Query::matching("title", "red shoes")])
            .filter([Query::range("price.priceMajor").gte(10).lt(100).into()])
            .minimum_should_match(1)
            .into();

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "bool": {
                    "must": [{"match": {"title": {"query": "red shoes"}}}],
                    "filter": [{"range": {"price.priceMajor": {"gte": 10, "lt": 100}}}],
                    "minimum_should_match": 1
                }
            })
        );
    }

    #[test]
    fn test_empty_bool() {
        let query: Query = Query::bool().into();
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({"bool": {}}));
    }
}

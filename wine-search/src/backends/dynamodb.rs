//! DynamoDB wine table: index queries first, filtered scan as a fallback.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Map, Number, Value};
use tracing::{debug, info, warn};

use super::{ensure_id, field_f64, field_str, sort_by_rating, tag_source, SearchBackend};
use crate::config::Config;
use crate::models::{source, RawRecord, SearchFilters};
use crate::{Error, Result};

const BACKEND: &str = "dynamodb";

/// Upper bound on scan pages read while collecting filtered matches.
const MAX_SCAN_PAGES: usize = 20;

/// Scalar bound into an expression placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    S(String),
    N(f64),
}

impl ExprValue {
    fn to_attribute(&self) -> AttributeValue {
        match self {
            ExprValue::S(s) => AttributeValue::S(s.clone()),
            ExprValue::N(n) => AttributeValue::N(n.to_string()),
        }
    }
}

/// Placeholder maps shared by key conditions and filter expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, ExprValue>,
}

impl Expression {
    fn attribute_values(&self) -> HashMap<String, AttributeValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_attribute()))
            .collect()
    }
}

/// A query against one global secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub index: &'static str,
    pub key: Expression,
    /// `false` reads the highest rating first
    pub scan_forward: bool,
}

/// Index queries to attempt, in order, for a term and filters.
///
/// An exact name lookup comes first, then the type and country indexes
/// (with a rating range condition when a rating floor is set).
pub fn index_queries(term: &str, filters: &SearchFilters) -> Vec<IndexQuery> {
    let mut queries = Vec::new();

    if !term.is_empty() {
        queries.push(IndexQuery {
            index: "NameIndex",
            key: Expression {
                expression: "#name = :name".to_string(),
                names: HashMap::from([("#name".to_string(), "name".to_string())]),
                values: HashMap::from([(":name".to_string(), ExprValue::S(term.to_string()))]),
            },
            scan_forward: true,
        });
    }

    let ranged = |index: &'static str, attr: &str, value: &str| {
        let placeholder = format!("#{}", attr);
        let mut key = Expression {
            expression: format!("{} = :v", placeholder),
            names: HashMap::from([(placeholder, attr.to_string())]),
            values: HashMap::from([(":v".to_string(), ExprValue::S(value.to_string()))]),
        };
        if let Some(min) = filters.min_rating {
            key.expression.push_str(" AND #rating >= :minr");
            key.names.insert("#rating".to_string(), "rating".to_string());
            key.values.insert(":minr".to_string(), ExprValue::N(min));
        }
        IndexQuery {
            index,
            key,
            scan_forward: false,
        }
    };

    if let Some(wine_type) = filters.wine_type.as_deref() {
        queries.push(ranged("TypeIndex", "type", wine_type));
    }
    if let Some(country) = filters.country.as_deref() {
        queries.push(ranged("CountryIndex", "country", country));
    }
    queries
}

/// Filter expression for the fallback scan, or `None` when unfiltered.
///
/// Matching is case-sensitive, mirroring how names are stored.
pub fn scan_filter(term: &str, filters: &SearchFilters) -> Option<Expression> {
    let mut clauses = Vec::new();
    let mut filter = Expression::default();
    let mut bind = |clause: &str, name: &str, attr: &str, placeholder: &str, value: ExprValue| {
        clauses.push(clause.to_string());
        filter.names.insert(name.to_string(), attr.to_string());
        filter.values.insert(placeholder.to_string(), value);
    };

    if !term.is_empty() {
        bind(
            "contains(#name, :search_term)",
            "#name",
            "name",
            ":search_term",
            ExprValue::S(term.to_string()),
        );
    }
    if let Some(wine_type) = &filters.wine_type {
        bind("#type = :wine_type", "#type", "type", ":wine_type", ExprValue::S(wine_type.clone()));
    }
    if let Some(country) = &filters.country {
        bind(
            "contains(#country, :country)",
            "#country",
            "country",
            ":country",
            ExprValue::S(country.clone()),
        );
    }
    if let Some(min) = filters.min_rating {
        bind("#rating >= :min_rating", "#rating", "rating", ":min_rating", ExprValue::N(min));
    }
    if let Some(max) = filters.max_price {
        bind("#price <= :max_price", "#price", "price", ":max_price", ExprValue::N(max));
    }

    if clauses.is_empty() {
        return None;
    }
    filter.expression = clauses.join(" AND ");
    Some(filter)
}

/// Client-side check applied to index hits.
fn passes(record: &RawRecord, term: &str, filters: &SearchFilters) -> bool {
    if let Some(min) = filters.min_rating {
        if field_f64(record, "rating").unwrap_or(0.0) < min {
            return false;
        }
    }
    if let (Some(max), Some(price)) = (filters.max_price, field_f64(record, "price")) {
        if price > max {
            return false;
        }
    }
    if let Some(wine_type) = &filters.wine_type {
        if !field_str(record, "type").contains(wine_type.as_str()) {
            return false;
        }
    }
    if let Some(country) = &filters.country {
        if !field_str(record, "country").contains(country.as_str()) {
            return false;
        }
    }
    term.is_empty() || field_str(record, "name").contains(term)
}

/// Convert a DynamoDB attribute into JSON; whole numbers stay integers.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                .collect(),
        ),
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| number_to_json(n)).collect()),
        _ => Value::Null,
    }
}

fn number_to_json(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    match raw.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Number((f as i64).into()),
        Ok(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Err(_) => Value::Null,
    }
}

/// DynamoDB `Limit` for a result count, saturating at `i32::MAX`.
fn page_limit(limit: usize) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

fn item_to_record(item: &HashMap<String, AttributeValue>) -> RawRecord {
    item.iter()
        .map(|(k, v)| (k.clone(), attribute_to_json(v)))
        .collect::<Map<String, Value>>()
}

/// The `{prefix}wines` table and its name/type/country indexes.
pub struct DynamoWineTable {
    client: DynamoClient,
    table_name: String,
}

impl DynamoWineTable {
    pub fn new(client: DynamoClient, table_prefix: &str) -> Self {
        Self {
            client,
            table_name: format!("{}wines", table_prefix),
        }
    }

    /// Build a client from shared AWS config, honoring a custom endpoint.
    pub fn from_config(config: &Config, sdk_config: &aws_config::SdkConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);
        if let Some(endpoint) = &config.dynamodb_endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(
            DynamoClient::from_conf(builder.build()),
            &config.dynamodb_table_prefix,
        )
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn query_index(&self, query: &IndexQuery, limit: usize) -> Result<Vec<RawRecord>> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(query.index)
            .key_condition_expression(&query.key.expression)
            .set_expression_attribute_names(Some(query.key.names.clone()))
            .set_expression_attribute_values(Some(query.key.attribute_values()))
            .scan_index_forward(query.scan_forward)
            .limit(page_limit(limit))
            .send()
            .await
            .map_err(|e| Error::unavailable(BACKEND, format!("{} query failed: {}", query.index, e)))?;

        Ok(output.items().iter().map(item_to_record).collect())
    }

    async fn scan(&self, term: &str, filters: &SearchFilters, limit: usize) -> Result<Vec<RawRecord>> {
        let Some(filter) = scan_filter(term, filters) else {
            // Unfiltered scans may use Limit directly.
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .limit(page_limit(limit))
                .send()
                .await
                .map_err(|e| Error::unavailable(BACKEND, format!("scan failed: {}", e)))?;
            return Ok(output.items().iter().map(item_to_record).collect());
        };

        // Limit counts items evaluated before filtering, so page instead.
        let mut wines = Vec::new();
        let mut start_key = None;
        for _ in 0..MAX_SCAN_PAGES {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression(&filter.expression)
                .set_expression_attribute_names(Some(filter.names.clone()))
                .set_expression_attribute_values(Some(filter.attribute_values()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| Error::unavailable(BACKEND, format!("scan failed: {}", e)))?;

            wines.extend(output.items().iter().map(item_to_record));
            if wines.len() >= limit {
                break;
            }
            match output.last_evaluated_key() {
                Some(key) => start_key = Some(key.clone()),
                None => break,
            }
        }
        wines.truncate(limit);
        Ok(wines)
    }

    fn finish(mut wines: Vec<RawRecord>, limit: usize) -> Vec<RawRecord> {
        sort_by_rating(&mut wines);
        wines.truncate(limit);
        for wine in &mut wines {
            let fallback = format!("dynamodb-{}", field_str(wine, "name"));
            ensure_id(wine, || fallback);
            tag_source(wine, source::DYNAMODB);
        }
        wines
    }
}

#[async_trait]
impl SearchBackend for DynamoWineTable {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn search(
        &self,
        term: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<RawRecord>> {
        let term = term.trim();

        for query in index_queries(term, filters) {
            match self.query_index(&query, limit).await {
                Ok(items) => {
                    let hits: Vec<RawRecord> = items
                        .into_iter()
                        .filter(|item| passes(item, term, filters))
                        .collect();
                    if !hits.is_empty() {
                        info!(
                            table = self.table_name(),
                            index = query.index,
                            count = hits.len(),
                            "DynamoDB index hit"
                        );
                        return Ok(Self::finish(hits, limit));
                    }
                    debug!(index = query.index, "DynamoDB index returned no usable items");
                }
                Err(e) => warn!(index = query.index, error = %e, "DynamoDB index query failed"),
            }
        }

        let wines = self.scan(term, filters, limit).await?;
        Ok(Self::finish(wines, limit))
    }
}

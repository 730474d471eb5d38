//! The graph driver capability.
//!
//! The engine never owns a connection to the graph store. Callers supply an
//! implementation of [`GraphDriver`] — anything that can execute a
//! parameterized query and hand back rows of entities. Read queries use
//! `MATCH … RETURN`; write queries use `MATCH … SET n.P = $param`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::{EngineError, GraphError};
use crate::query::safe_label;
use crate::value::Value;

/// One result row: query alias → entity snapshot.
pub type ResultRow = HashMap<String, Entity>;

/// Asynchronous access to the underlying graph store.
///
/// Implementations must accept any number of named parameters; the engine
/// never splices user data into query text.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Executes one parameterized query and returns its rows.
    ///
    /// Write queries return an empty row set.
    async fn run(
        &self,
        query: &str,
        params: HashMap<String, Value>,
    ) -> Result<Vec<ResultRow>, GraphError>;
}

/// Builds the snapshot-fetch query for one entity.
pub(crate) fn entity_by_id_query(
    entity_type: &str,
    entity_id: &str,
) -> Result<(String, HashMap<String, Value>), EngineError> {
    let label = safe_label(entity_type)?;
    let query = format!("MATCH (n:{label}) WHERE n.id = $id RETURN n");
    let params = HashMap::from([("id".to_string(), Value::String(entity_id.to_string()))]);
    Ok((query, params))
}

/// Builds the single-property write query for one entity.
pub(crate) fn set_property_query(
    entity_type: &str,
    entity_id: &str,
    property: &str,
    value: Value,
) -> Result<(String, HashMap<String, Value>), EngineError> {
    let label = safe_label(entity_type)?;
    let prop = safe_label(property)?;
    let query = format!("MATCH (n:{label}) WHERE n.id = $id SET n.{prop} = $value");
    let params = HashMap::from([
        ("id".to_string(), Value::String(entity_id.to_string())),
        ("value".to_string(), value),
    ]);
    Ok((query, params))
}

/// Fetches one entity snapshot, or `None` when the id does not resolve.
pub(crate) async fn fetch_entity(
    driver: &dyn GraphDriver,
    entity_type: &str,
    entity_id: &str,
) -> Result<Option<Entity>, EngineError> {
    let (query, params) = entity_by_id_query(entity_type, entity_id)?;
    let mut rows = driver.run(&query, params).await.map_err(EngineError::Graph)?;
    let result = rows.drain(..).next().and_then(|mut row| row.remove("n"));
    Ok(result)
}

/// Writes one property value through the driver.
pub(crate) async fn write_property(
    driver: &dyn GraphDriver,
    entity_type: &str,
    entity_id: &str,
    property: &str,
    value: Value,
) -> Result<(), EngineError> {
    let (query, params) = set_property_query(entity_type, entity_id, property, value)?;
    driver.run(&query, params).await.map_err(EngineError::Graph)?;
    Ok(())
}

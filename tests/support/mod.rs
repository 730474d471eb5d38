//! In-memory graph driver for the end-to-end suites.
//!
//! The engine and translator emit a narrow set of query shapes (snapshot
//! fetches, single-property writes, `MATCH … WHERE … RETURN` reads with
//! conjunctive constraints). This double stores entities and relationships
//! in maps and interprets exactly those shapes, so the tests exercise the
//! real pipeline without a graph server.

// Each integration binary compiles this module; not all of them use every
// helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;

use rulegraph::{Entity, GraphDriver, ResultRow, Value};
use rulegraph::error::GraphError;

/// One recorded property write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub property: String,
    pub value: Value,
}

#[derive(Default)]
struct Store {
    /// `(entity_type, id)` → entity.
    entities: HashMap<(String, String), Entity>,
    /// `(from_id, relationship, to_id)`.
    edges: Vec<(String, String, String)>,
}

/// In-memory graph with write and query logs.
#[derive(Default)]
pub struct InMemoryGraph {
    store: Mutex<Store>,
    writes: Mutex<Vec<WriteRecord>>,
    queries: Mutex<Vec<String>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: Entity) {
        self.store
            .lock()
            .entities
            .insert((entity.entity_type.clone(), entity.id.clone()), entity);
    }

    pub fn link(&self, from_id: &str, relationship: &str, to_id: &str) {
        self.store.lock().edges.push((
            from_id.to_string(),
            relationship.to_string(),
            to_id.to_string(),
        ));
    }

    pub fn entity(&self, entity_type: &str, id: &str) -> Option<Entity> {
        self.store
            .lock()
            .entities
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    fn apply_write(
        &self,
        query: &str,
        params: &HashMap<String, Value>,
    ) -> Result<(), GraphError> {
        // Shape: MATCH (n:Label) WHERE n.id = $id SET n.prop = $value
        let re = regex(r"^MATCH \(n:(\w+)\) WHERE n\.id = \$id SET n\.(\w+) = \$value$");
        let captures = re.captures(query).ok_or_else(|| GraphError::Backend {
            message: format!("unsupported write shape: {query}"),
        })?;
        let entity_type = captures[1].to_string();
        let property = captures[2].to_string();
        let Some(Value::String(id)) = params.get("id") else {
            return Err(GraphError::Backend {
                message: "write without $id".to_string(),
            });
        };
        let value = params.get("value").cloned().unwrap_or(Value::Null);

        let mut store = self.store.lock();
        if let Some(entity) = store
            .entities
            .get_mut(&(entity_type.clone(), id.clone()))
        {
            entity.set_property(&property, value.clone());
        }
        drop(store);

        self.writes.lock().push(WriteRecord {
            entity_type,
            entity_id: id.clone(),
            property,
            value,
        });
        Ok(())
    }

    fn run_read(
        &self,
        query: &str,
        params: &HashMap<String, Value>,
    ) -> Result<Vec<ResultRow>, GraphError> {
        let store = self.store.lock();

        // Node aliases: (alias:Label)
        let mut aliases: Vec<(String, String)> = Vec::new();
        for captures in regex(r"\((\w+):(\w+)\)").captures_iter(query) {
            aliases.push((captures[1].to_string(), captures[2].to_string()));
        }
        let return_alias = regex(r"RETURN (\w+)$")
            .captures(query)
            .map(|c| c[1].to_string())
            .ok_or_else(|| GraphError::Backend {
                message: format!("read without RETURN: {query}"),
            })?;

        // Constraint atoms. The translator only joins conjunctions of these
        // shapes, so scanning the text is sound for the emitted queries.
        let id_atoms: Vec<(String, String)> = regex(r"(\w+)\.id = \$(\w+)")
            .captures_iter(query)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        let cmp_atoms: Vec<(String, String, String, String)> =
            regex(r"(\w+)\.(\w+) (<=|>=|<>|=|<|>) \$(\w+)")
                .captures_iter(query)
                .filter(|c| &c[2] != "id")
                .map(|c| (c[1].to_string(), c[2].to_string(), c[3].to_string(), c[4].to_string()))
                .collect();
        let in_atoms: Vec<(String, String, String)> = regex(r"(\w+)\.(\w+) IN \$(\w+)")
            .captures_iter(query)
            .map(|c| (c[1].to_string(), c[2].to_string(), c[3].to_string()))
            .collect();
        let null_atoms: Vec<(String, String, bool)> = regex(r"(\w+)\.(\w+) IS (NOT )?NULL")
            .captures_iter(query)
            .map(|c| (c[1].to_string(), c[2].to_string(), c.get(3).is_some()))
            .collect();
        // An EXISTS block may carry an inner WHERE. Its endpoints are always
        // correlated outer aliases (the parser requires bound variables), so
        // the inner predicate's atoms are enforced against the same row
        // assignment by the scans above; only the edge itself is checked
        // here.
        let exists_atoms: Vec<(String, String, String)> =
            regex(r"EXISTS \{ MATCH \((\w+)\)-\[:(\w+)\]->\((\w+)\)(?: WHERE [^}]*)? \}")
                .captures_iter(query)
                .map(|c| (c[1].to_string(), c[2].to_string(), c[3].to_string()))
                .collect();

        // Candidate sets per alias.
        let mut candidates: Vec<(String, Vec<Entity>)> = Vec::new();
        for (alias, label) in &aliases {
            let required_id = id_atoms
                .iter()
                .find(|(a, _)| a == alias)
                .and_then(|(_, param)| params.get(param))
                .and_then(|v| v.as_str().map(str::to_string));
            let set: Vec<Entity> = store
                .entities
                .values()
                .filter(|e| &e.entity_type == label)
                .filter(|e| required_id.as_deref().map_or(true, |id| e.id == id))
                .cloned()
                .collect();
            candidates.push((alias.clone(), set));
        }
        drop(store);

        // Cartesian enumeration (the emitted queries bind at most a few
        // aliases; tests stay tiny).
        let mut rows: Vec<ResultRow> = Vec::new();
        let mut seen_ids: Vec<String> = Vec::new();
        enumerate(&candidates, &mut HashMap::new(), 0, &mut |assignment| {
            for (alias, property, op, param) in &cmp_atoms {
                let Some(entity) = assignment.get(alias.as_str()) else {
                    return;
                };
                let Some(expected) = params.get(param) else {
                    return;
                };
                if !holds(op, &entity.property(property), expected) {
                    return;
                }
            }
            for (alias, property, param) in &in_atoms {
                let Some(entity) = assignment.get(alias.as_str()) else {
                    return;
                };
                let Some(Value::List(list)) = params.get(param) else {
                    return;
                };
                let actual = entity.property(property);
                if !list.iter().any(|item| values_equal(&actual, item)) {
                    return;
                }
            }
            for (alias, property, negated) in &null_atoms {
                let Some(entity) = assignment.get(alias.as_str()) else {
                    return;
                };
                if entity.property(property).is_null() == *negated {
                    return;
                }
            }
            for (from, relationship, to) in &exists_atoms {
                let (Some(source), Some(target)) =
                    (assignment.get(from.as_str()), assignment.get(to.as_str()))
                else {
                    return;
                };
                let store = self.store.lock();
                let connected = store.edges.iter().any(|(f, r, t)| {
                    f == &source.id && r == relationship && t == &target.id
                });
                if !connected {
                    return;
                }
            }

            let Some(returned) = assignment.get(return_alias.as_str()) else {
                return;
            };
            if seen_ids.contains(&returned.id) {
                return;
            }
            seen_ids.push(returned.id.clone());
            rows.push(HashMap::from([(return_alias.clone(), returned.clone())]));
        });

        Ok(rows)
    }
}

/// Depth-first cartesian product over the candidate sets.
fn enumerate<'a>(
    candidates: &'a [(String, Vec<Entity>)],
    assignment: &mut HashMap<&'a str, Entity>,
    index: usize,
    visit: &mut impl FnMut(&HashMap<&'a str, Entity>),
) {
    if index == candidates.len() {
        visit(assignment);
        return;
    }
    let (alias, set) = &candidates[index];
    for entity in set {
        assignment.insert(alias.as_str(), entity.clone());
        enumerate(candidates, assignment, index + 1, visit);
    }
    assignment.remove(alias.as_str());
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            (*a as f64 - b).abs() == 0.0
        }
        _ => left == right,
    }
}

fn holds(op: &str, actual: &Value, expected: &Value) -> bool {
    match op {
        "=" => values_equal(actual, expected),
        "<>" => !actual.is_null() && !expected.is_null() && !values_equal(actual, expected),
        _ => {
            let ordering = match (actual, expected) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    let (Some(a), Some(b)) = (actual.as_float(), expected.as_float()) else {
                        return false;
                    };
                    let Some(ordering) = a.partial_cmp(&b) else {
                        return false;
                    };
                    ordering
                }
            };
            match op {
                "<" => ordering.is_lt(),
                ">" => ordering.is_gt(),
                "<=" => ordering.is_le(),
                ">=" => ordering.is_ge(),
                _ => false,
            }
        }
    }
}

fn regex(pattern: &'static str) -> Regex {
    static CACHE: OnceLock<Mutex<HashMap<&'static str, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock();
    cache
        .entry(pattern)
        .or_insert_with(|| Regex::new(pattern).expect("static pattern"))
        .clone()
}

#[async_trait]
impl GraphDriver for InMemoryGraph {
    async fn run(
        &self,
        query: &str,
        params: HashMap<String, Value>,
    ) -> Result<Vec<ResultRow>, GraphError> {
        self.queries.lock().push(query.to_string());
        if query.contains(" SET ") {
            self.apply_write(query, &params)?;
            Ok(Vec::new())
        } else {
            self.run_read(query, &params)
        }
    }
}

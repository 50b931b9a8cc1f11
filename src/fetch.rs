use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::endpoints::Fanout;
use crate::error::{Exhaustion, FetchError};
use crate::record::{EntityId, EntityKind};
use crate::resolver::FetchRequest;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamCall {
    pub endpoint: &'static str,
    pub params: BTreeMap<String, String>,
}

impl UpstreamCall {
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.endpoint.as_bytes());
        for (k, v) in &self.params {
            hasher.update(b"\x1f");
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    pub fn describe(&self) -> String {
        let id = ["PlayerID", "TeamID"]
            .iter()
            .find_map(|k| self.params.get(*k).map(|v| format!(" {k}={v}")))
            .unwrap_or_default();
        format!("{}{}", self.endpoint, id)
    }
}

pub trait StatsSource {
    fn lookup_cached(&mut self, _call: &UpstreamCall) -> Option<String> {
        None
    }

    fn call(&mut self, call: &UpstreamCall) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResultSet {
    pub name: String,
    pub headers: Vec<String>,
    #[serde(rename = "rowSet")]
    pub row_set: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<RawResultSet>),
    One(RawResultSet),
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(rename = "resultSets", default)]
    result_sets: Option<OneOrMany>,
    #[serde(rename = "resultSet", default)]
    result_set: Option<OneOrMany>,
}

pub fn parse_response(body: &str) -> Result<Vec<RawResultSet>, FetchError> {
    let env: ApiEnvelope =
        serde_json::from_str(body).map_err(|err| FetchError::Decode(err.to_string()))?;
    let sets = env
        .result_sets
        .or(env.result_set)
        .ok_or_else(|| FetchError::Decode("no resultSets in response".to_string()))?;
    Ok(match sets {
        OneOrMany::Many(sets) => sets,
        OneOrMany::One(set) => vec![set],
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: HashMap<String, Value>,
}

impl Row {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        as_f64_any(self.fields.get(field)?)
    }

    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn id(&self, field: &str) -> Option<EntityId> {
        let value = self.fields.get(field)?;
        if let Some(n) = value.as_i64() {
            return Some(n);
        }
        value.as_str()?.trim().parse::<EntityId>().ok()
    }
}

fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<f64>().ok()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: BTreeMap<EntityId, Vec<Row>>,
}

impl ResultSet {
    pub fn rows_for(&self, id: EntityId) -> &[Row] {
        self.rows.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedEndpoint {
    pub sets: HashMap<String, ResultSet>,
    /// Entities the upstream actually answered for. An entity in here with
    /// no rows in a set was measured as zero; one outside was not measured.
    pub covered: BTreeSet<EntityId>,
    pub calls_ok: usize,
    pub calls_failed: usize,
    pub last_error: Option<String>,
}

impl FetchedEndpoint {
    pub fn is_failed(&self) -> bool {
        self.calls_ok == 0 && self.calls_failed > 0
    }

    pub fn set(&self, name: &str) -> Option<&ResultSet> {
        self.sets.get(name)
    }

    pub fn is_measured(&self, id: EntityId) -> bool {
        self.covered.contains(&id)
    }

    fn absorb(&mut self, sets: Vec<RawResultSet>, kind: EntityKind, target: Option<EntityId>) {
        let id_field = kind.id_field();
        if let Some(id) = target {
            self.covered.insert(id);
        }
        for raw in sets {
            let entry = self.sets.entry(raw.name.clone()).or_default();
            for values in raw.row_set {
                let row = Row::from_pairs(raw.headers.iter().cloned().zip(values));
                let Some(id) = target.or_else(|| row.id(id_field)) else {
                    continue;
                };
                self.covered.insert(id);
                entry.rows.entry(id).or_default().push(row);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FanoutTargets {
    pub players: Vec<EntityId>,
    pub teams: Vec<EntityId>,
}

#[derive(Debug)]
pub struct Pacer {
    min_delay: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: None,
        }
    }

    pub fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                thread::sleep(self.min_delay - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

pub struct ResultSetFetcher<S: StatsSource> {
    source: S,
    pacer: Pacer,
    failure_threshold: u32,
    failure_streak: u32,
    upstream_calls: usize,
    cache: HashMap<FetchRequest, Rc<FetchedEndpoint>>,
}

impl<S: StatsSource> ResultSetFetcher<S> {
    pub fn new(source: S, min_delay: Duration, failure_threshold: u32) -> Self {
        Self {
            source,
            pacer: Pacer::new(min_delay),
            failure_threshold: failure_threshold.max(1),
            failure_streak: 0,
            upstream_calls: 0,
            cache: HashMap::new(),
        }
    }

    pub fn upstream_calls(&self) -> usize {
        self.upstream_calls
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn begin_pass(&mut self) {
        self.cache.clear();
    }

    pub fn fetch(
        &mut self,
        request: &FetchRequest,
        targets: &FanoutTargets,
    ) -> Result<Rc<FetchedEndpoint>, Exhaustion> {
        if let Some(done) = self.cache.get(request) {
            debug!(endpoint = request.endpoint, "request already fetched this pass");
            return Ok(Rc::clone(done));
        }

        let calls = expand_calls(request, targets);
        let total = calls.len();
        let mut fetched = FetchedEndpoint::default();

        for (done, (target, call)) in calls.into_iter().enumerate() {
            match self.execute(&call) {
                Ok(sets) => {
                    fetched.absorb(sets, request.kind, target);
                    fetched.calls_ok += 1;
                }
                Err(err) if err.is_exhaustion_signal() => {
                    warn!(call = %call.describe(), error = %err, "upstream exhaustion signal");
                    return Err(Exhaustion {
                        endpoint: request.endpoint.to_string(),
                        reason: err.to_string(),
                        calls_done: done,
                        calls_total: total,
                    });
                }
                Err(err) => {
                    fetched.calls_failed += 1;
                    fetched.last_error = Some(err.to_string());
                    if err.counts_toward_exhaustion() {
                        self.failure_streak += 1;
                    }
                    warn!(
                        call = %call.describe(),
                        error = %err,
                        streak = self.failure_streak,
                        "upstream request failed"
                    );
                    if self.failure_streak >= self.failure_threshold {
                        return Err(Exhaustion {
                            endpoint: request.endpoint.to_string(),
                            reason: format!(
                                "{} consecutive failures, last: {err}",
                                self.failure_streak
                            ),
                            calls_done: done,
                            calls_total: total,
                        });
                    }
                }
            }
            if total > 1 && (done + 1) % 50 == 0 {
                info!(endpoint = request.endpoint, done = done + 1, total, "fan-out progress");
            }
        }

        let fetched = Rc::new(fetched);
        if !fetched.is_failed() {
            self.cache.insert(request.clone(), Rc::clone(&fetched));
        }
        Ok(fetched)
    }

    fn execute(&mut self, call: &UpstreamCall) -> Result<Vec<RawResultSet>, FetchError> {
        if let Some(body) = self.source.lookup_cached(call) {
            match parse_response(&body) {
                Ok(sets) => {
                    debug!(call = %call.describe(), "served from response cache");
                    return Ok(sets);
                }
                Err(err) => debug!(call = %call.describe(), error = %err, "discarding cached body"),
            }
        }
        self.pacer.wait();
        self.upstream_calls += 1;
        let sets = self.source.call(call).and_then(|body| parse_response(&body))?;
        self.failure_streak = 0;
        Ok(sets)
    }
}

fn expand_calls(
    request: &FetchRequest,
    targets: &FanoutTargets,
) -> Vec<(Option<EntityId>, UpstreamCall)> {
    let (ids, param) = match request.fanout {
        Fanout::League => {
            let call = UpstreamCall {
                endpoint: request.endpoint,
                params: request.params.clone(),
            };
            return vec![(None, call)];
        }
        Fanout::PerPlayer => (&targets.players, "PlayerID"),
        Fanout::PerTeam => (&targets.teams, "TeamID"),
    };
    ids.iter()
        .map(|id| {
            let mut params = request.params.clone();
            params.insert(param.to_string(), id.to_string());
            (
                Some(*id),
                UpstreamCall {
                    endpoint: request.endpoint,
                    params,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_result_set_envelope() {
        let body = r#"{"resultSet":{"name":"X","headers":["PLAYER_ID","PTS"],"rowSet":[[7,"12"]]}}"#;
        let sets = parse_response(body).unwrap();
        assert_eq!(sets.len(), 1);
        let row = Row::from_pairs(sets[0].headers.iter().cloned().zip(sets[0].row_set[0].clone()));
        assert_eq!(row.id("PLAYER_ID"), Some(7));
        assert_eq!(row.number("PTS"), Some(12.0));
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("Season".to_string(), "2024-25".to_string());
        a.insert("SeasonType".to_string(), "Playoffs".to_string());
        let mut b = BTreeMap::new();
        b.insert("SeasonType".to_string(), "Playoffs".to_string());
        b.insert("Season".to_string(), "2024-25".to_string());
        let ca = UpstreamCall { endpoint: "e", params: a };
        let cb = UpstreamCall { endpoint: "e", params: b };
        assert_eq!(ca.fingerprint(), cb.fingerprint());
        assert_eq!(ca.fingerprint().len(), 64);
    }
}

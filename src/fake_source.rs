use serde_json::{Value, json};

use crate::error::FetchError;
use crate::fetch::{StatsSource, UpstreamCall};

#[derive(Debug, Clone)]
struct Rule {
    endpoint: String,
    params: Vec<(String, String)>,
    outcome: Result<String, FetchError>,
}

impl Rule {
    fn matches(&self, call: &UpstreamCall) -> bool {
        self.endpoint == call.endpoint
            && self
                .params
                .iter()
                .all(|(k, v)| call.params.get(k).is_some_and(|have| have == v))
    }
}

/// Answers calls from canned rules. The most specific matching rule wins;
/// calls nothing matches get an HTTP 400.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    rules: Vec<Rule>,
    calls: Vec<UpstreamCall>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&mut self, endpoint: &str, params: &[(&str, &str)], body: String) -> &mut Self {
        self.push(endpoint, params, Ok(body))
    }

    pub fn fail(&mut self, endpoint: &str, params: &[(&str, &str)], error: FetchError) -> &mut Self {
        self.push(endpoint, params, Err(error))
    }

    pub fn calls(&self) -> &[UpstreamCall] {
        &self.calls
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls.iter().filter(|c| c.endpoint == endpoint).count()
    }

    fn push(
        &mut self,
        endpoint: &str,
        params: &[(&str, &str)],
        outcome: Result<String, FetchError>,
    ) -> &mut Self {
        self.rules.push(Rule {
            endpoint: endpoint.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            outcome,
        });
        self
    }
}

impl StatsSource for ScriptedSource {
    fn call(&mut self, call: &UpstreamCall) -> Result<String, FetchError> {
        self.calls.push(call.clone());
        // Later rules win ties so a test can override an earlier setup.
        let rule = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(call))
            .max_by_key(|(idx, r)| (r.params.len(), *idx))
            .map(|(_, r)| r);
        match rule {
            Some(rule) => rule.outcome.clone(),
            None => Err(FetchError::Http {
                status: 400,
                body: format!("no scripted response for {}", call.describe()),
            }),
        }
    }
}

pub struct SetSpec<'a> {
    pub name: &'a str,
    pub headers: &'a [&'a str],
    pub rows: Vec<Vec<Value>>,
}

pub fn response_body(sets: &[SetSpec<'_>]) -> String {
    let sets = sets
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "headers": s.headers,
                "rowSet": s.rows,
            })
        })
        .collect::<Vec<_>>();
    json!({ "resultSets": sets }).to_string()
}

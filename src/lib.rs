pub mod checkpoint;
pub mod column_spec;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod extract;
pub mod fake_source;
pub mod fetch;
pub mod http_client;
pub mod nba_api;
pub mod orchestrator;
pub mod percentile;
pub mod query;
pub mod record;
pub mod resolver;
pub mod response_cache;
pub mod scaler;
pub mod season;
pub mod settings;
pub mod store;
pub mod subtract;
pub mod supervisor;
pub mod telemetry;

mod common;
mod orchestrator;
mod store;

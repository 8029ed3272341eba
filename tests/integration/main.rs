//! Integration tests: price watcher lifecycle and end-to-end portfolio flows.

mod mock_supplier;
mod portfolio_flow;
mod watcher;

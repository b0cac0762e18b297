pub mod audit;
pub mod backend;
pub mod classify;
pub mod config;
pub mod fingerprint;
pub mod lock;
pub mod manifest;
pub mod paths;
pub mod progress;
pub mod reconcile;
pub mod scanner;
pub mod volume;
pub mod warn;

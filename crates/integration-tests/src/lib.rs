//! End-to-end tests for the batch image service live under `tests/`

//! Integration tests: full allocation requests over mock collaborators.

mod mock_protocols;
mod pipeline;

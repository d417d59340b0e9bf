//! Pathfinding support.
//!
//! Only `registry` (§4.10, the request/owner correlation map) is part of
//! the engine: this core never solves paths itself, it only correlates
//! requests/results through `WorldAdapter::request_path`/`poll_path_results`.
//! The teacher's own synchronous A*/JPS grid solver and `PathfindingQueue`
//! Bevy-system plugin solve that problem for a single-process simulation and
//! have no counterpart here, since path solving is the host's job (§6.1).

pub mod registry;

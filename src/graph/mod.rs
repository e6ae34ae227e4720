//! Graph layer: the heap graph model, edge strength rules, and the two
//! passes of the retention analysis (forward discovery, backward
//! minimization).

pub mod forward;
pub mod minimize;
pub mod model;
pub mod taxonomy;

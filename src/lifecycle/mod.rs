// Position lifecycle supervision
//
// Two managers run against open positions after entry: the partial profit
// manager walks an R-multiple ladder and tightens stops, the hedge manager
// resolves opposing BUY/SELL pairs on the same symbol. Both treat the
// gateway's position list as the source of truth on every pass.

pub mod hedge;
pub mod partial_profit;

pub use hedge::{HedgeAssessment, HedgeDecision, HedgeManager, HedgePair};
pub use partial_profit::PartialProfitManager;

pub mod distribution;
pub mod returns;

pub use distribution::{
    run_waterfall, run_waterfall_input, EventAllocation, ProceedsEvent, TierAllocation,
    WaterfallBreakdown, WaterfallConfig, WaterfallInput, WaterfallResult, WaterfallTier,
};
pub use returns::{summarise_returns, HolderReturns, ReturnsSummary};

pub mod sources_uses;
pub mod structure;

pub use structure::{
    build_capital_structure, CapitalStructure, CapitalStructureConfig, DebtTranche,
    EquityTranche, LeverageTargets, TrancheKind, UsesOfFunds,
};

//! The five supervision pages, one module each.

pub mod anomaly;
pub mod asset_loss;
pub mod compliance;
pub mod credit_risk;
pub mod insolvency;

pub use anomaly::{AnomalyConfig, AnomalyDetection, AnomalyRow, AnomalySummary, MonthlyActivity};
pub use asset_loss::{
    AssetLossConfig, AssetLossRegression, AssetLossRow, AssetLossSummary, LossBasis, MonthlyAssets,
};
pub use compliance::{
    ComplianceCheck, ComplianceConfig, ComplianceRow, ComplianceRules, ComplianceSummary,
    FundCapital,
};
pub use credit_risk::{
    CreditRiskClassification, CreditRiskConfig, CreditRiskModel, CreditRiskRow, CreditRiskSummary,
    Evaluation, FundCreditProfile, RiskLevel, WhatIfInput, WhatIfPrediction,
};
pub use insolvency::{
    FundLiquidity, InsolvencyConfig, InsolvencyRisk, InsolvencyRow, InsolvencySummary,
};

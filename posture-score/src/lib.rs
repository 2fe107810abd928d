mod engine;

pub use engine::{
    attack_surface_score, calculate, calculate_and_save, overall_score, pentest_score,
    vulnerability_score, RiskBreakdown, RiskReport, ScoreError,
};

//! Acceptance rules for a candidate configuration

use crate::metrics::ForecastMetrics;
use serde::{Deserialize, Serialize};

/// Outcome of comparing a candidate with production
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationDecision {
    /// RMSE improved by at least the required margin
    Accepted,
    /// Nothing in production to beat
    AcceptedNoProduction,
    /// Some error metric got worse by the warning threshold or more
    RejectedDegradation,
    /// No metric regressed but RMSE did not improve enough
    RejectedInsufficientImprovement,
    /// Production exists but could not be scored
    RejectedUnscoredProduction,
}

/// Record of the validate stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub validated: bool,
    pub decision: ValidationDecision,
    pub candidate_metrics: ForecastMetrics,
    pub production_metrics: Option<ForecastMetrics>,
    /// `(production - candidate) / production` on RMSE
    pub rmse_improvement: Option<f64>,
    pub reason: String,
}

/// Production side of the comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProductionScore<'a> {
    /// No configuration has been deployed
    NotDeployed,
    /// Deployed but its evaluation failed
    Unscored,
    /// Deployed and scored on the candidate's folds
    Scored(&'a ForecastMetrics),
}

/// Decide whether `candidate` may replace production
pub fn validate_candidate(
    candidate: &ForecastMetrics,
    production: ProductionScore<'_>,
    min_improvement: f64,
    max_degradation: f64,
) -> ValidationReport {
    let production = match production {
        ProductionScore::NotDeployed => {
            return ValidationReport {
                validated: true,
                decision: ValidationDecision::AcceptedNoProduction,
                candidate_metrics: *candidate,
                production_metrics: None,
                rmse_improvement: None,
                reason: "No production configuration; candidate accepted".to_string(),
            }
        }
        ProductionScore::Unscored => {
            return ValidationReport {
                validated: false,
                decision: ValidationDecision::RejectedUnscoredProduction,
                candidate_metrics: *candidate,
                production_metrics: None,
                rmse_improvement: None,
                reason: "Production configuration could not be scored for comparison"
                    .to_string(),
            }
        }
        ProductionScore::Scored(metrics) => metrics,
    };

    let regressions: Vec<String> = [
        ("RMSE", candidate.rmse, production.rmse),
        ("MAE", candidate.mae, production.mae),
        ("MAPE", candidate.mape, production.mape),
    ]
    .iter()
    .filter_map(|&(name, cand, prod)| {
        let change = if prod > 0.0 { (cand - prod) / prod } else { 0.0 };
        (change >= max_degradation).then(|| format!("{} +{:.1}%", name, change * 100.0))
    })
    .collect();

    let improvement = if production.rmse > 0.0 {
        (production.rmse - candidate.rmse) / production.rmse
    } else {
        0.0
    };

    let (validated, decision, reason) = if !regressions.is_empty() {
        (
            false,
            ValidationDecision::RejectedDegradation,
            format!("Candidate regresses on {}", regressions.join(", ")),
        )
    } else if improvement >= min_improvement {
        (
            true,
            ValidationDecision::Accepted,
            format!("RMSE improves by {:.1}%", improvement * 100.0),
        )
    } else {
        (
            false,
            ValidationDecision::RejectedInsufficientImprovement,
            format!(
                "RMSE improves by {:.1}%, below the required {:.1}%",
                improvement * 100.0,
                min_improvement * 100.0
            ),
        )
    };

    ValidationReport {
        validated,
        decision,
        candidate_metrics: *candidate,
        production_metrics: Some(*production),
        rmse_improvement: Some(improvement),
        reason,
    }
}

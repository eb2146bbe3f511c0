//! Formatted terminal output for plans and finished runs.
//!
//! Formatting lives here so:
//! - the engine returns plain data and stays testable
//! - output changes are localized

use crate::domain::{
    Characterization, CvStrategy, FamilyDetails, FittingResult, ModelFamily, SelectionOutcome,
};
use crate::orchestrator::RunPlan;

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn format_characterization(c: &Characterization) -> String {
    let dynamic = match c.dynamic_nonlinear {
        Some(flag) => yes_no(flag),
        None => "not tested",
    };
    format!(
        "Data: nonlinear={} | collinear={} | dynamic-nonlinear={}\n",
        yes_no(c.nonlinear),
        yes_no(c.collinear),
        dynamic
    )
}

fn strategy_label(strategy: Option<CvStrategy>) -> &'static str {
    strategy.map(|s| s.name()).unwrap_or("none (internal)")
}

fn list(out: &mut String, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title}:\n"));
    for line in lines {
        out.push_str(&format!("- {line}\n"));
    }
}

/// Decisions only (`spa plan`).
pub fn format_plan(plan: &RunPlan) -> String {
    let mut out = String::new();
    out.push_str("=== spa - model selection plan ===\n");
    out.push_str(&format_characterization(&plan.characterization));
    out.push_str(&format!(
        "Families: {}\n",
        plan.families.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
    ));
    out.push_str(&format!("CV strategy: {}\n", strategy_label(plan.strategy)));
    for (family, strategy) in &plan.candidates {
        if *strategy != plan.strategy {
            out.push_str(&format!("  {family} uses {}\n", strategy_label(*strategy)));
        }
    }
    list(&mut out, "Rationale", &plan.rationale);
    list(&mut out, "Warnings", &plan.warnings);
    out
}

fn format_details(details: &FamilyDetails) -> Option<String> {
    let text = match details {
        FamilyDetails::None => return None,
        FamilyDetails::Coefficients { names, values } => names
            .iter()
            .zip(values)
            .map(|(n, v)| format!("{n}={v:.4}"))
            .collect::<Vec<_>>()
            .join(" "),
        FamilyDetails::SelectedFeatures { names, coefficients } => {
            if names.is_empty() {
                "no features retained".to_string()
            } else {
                names
                    .iter()
                    .zip(coefficients)
                    .map(|(n, v)| format!("{n}={v:.4}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
        FamilyDetails::Components { count, active_features } => {
            format!("components={count} active_features={active_features}")
        }
        FamilyDetails::Ensemble { trees } => format!("trees={trees}"),
        FamilyDetails::SupportVectors { count } => format!("support_vectors={count}"),
        FamilyDetails::Reservoir { layers } => format!("layers={layers:?}"),
        FamilyDetails::StateOrder { order } => format!("order={order}"),
    };
    Some(text)
}

fn format_result_row(result: &FittingResult, selected: ModelFamily) -> String {
    let chosen = if result.family == selected { "*" } else { " " };
    let validation = result
        .validation
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{chosen} {:<9} train MSE={:.4} | {:<16} | test MSE={:.4} | {}\n",
        result.family.short_name(),
        result.mse_train,
        validation,
        result.mse_test,
        result.hyperparams
    )
}

/// Full run summary (`spa run`, `spa show`).
pub fn format_outcome(outcome: &SelectionOutcome) -> String {
    let mut out = String::new();
    out.push_str("=== spa - smart process analytics ===\n");
    out.push_str(&format!("Run: {}\n", outcome.created_at));
    out.push_str(&format_characterization(&outcome.characterization));
    out.push_str(&format!("CV strategy: {}\n", strategy_label(outcome.strategy)));

    out.push_str("\nCandidates (standardized units):\n");
    for result in outcome.results.values() {
        out.push_str(&format_result_row(result, outcome.selected));
    }
    for failure in &outcome.failures {
        out.push_str(&format!(
            "  {:<9} failed: {}\n",
            failure.family.short_name(),
            failure.reason
        ));
    }

    if let Some(nested) = &outcome.nested {
        out.push_str(&format!(
            "\nNested CV ({} outer iterations, original units):\n",
            nested.outer_labels.len()
        ));
        for (family, mean) in nested.families.iter().zip(&nested.mean_mse) {
            let chosen = if *family == nested.selected { "*" } else { " " };
            out.push_str(&format!("{chosen} {:<9} mean MSE={mean:.4}\n", family.short_name()));
        }
    }

    out.push_str(&format!("\nSelected model: {}\n", outcome.selected));
    if let Some(winner) = outcome.winner() {
        if let Some(details) = format_details(&winner.details) {
            out.push_str(&format!("Details: {details}\n"));
        }
        if let Some(stats) = &winner.post_fit {
            out.push_str(&format!(
                "Original units: train RMSE={:.4} | test RMSE={:.4}\n",
                stats.rmse_train_nontrans, stats.rmse_test_nontrans
            ));
            match &stats.residuals {
                Some(r) => out.push_str(&format!(
                    "Residuals: Ljung-Box Q={:.3} (critical {:.3}, {} lags) | dynamics {}\n",
                    r.q_stat,
                    r.critical,
                    r.acf.len(),
                    if r.dynamics_detected { "detected" } else { "not detected" }
                )),
                None => out.push_str("Residuals: too few rows to test\n"),
            }
        }
    }

    list(&mut out, "Rationale", &outcome.rationale);
    list(&mut out, "Warnings", &outcome.warnings);
    list(&mut out, "Advisories", &outcome.advisories);
    out
}

//! Risk scorer (spec §4.4): a weighted factor model that turns each
//! finding into a risk/confidence/impact triple plus a savings estimate.
//! Pure and deterministic — no I/O, no adapter, no store — matching the
//! teacher's `scoring.rs` posture of keeping the scoring engine testable
//! in isolation from the HTTP/db layers around it.

use chrono::{DateTime, Utc};

use crate::config::PricingConfig;
use crate::models::{
    ConfidenceLevel, EstimateConfidence, FactorScores, Recommendation, RecommendationDetails,
    RecommendationType, RiskLevel, RiskScore, SavingsEstimate, SavingsSummary,
};

/// `score(recommendations[]) -> (scores[], savings_details[], savings_summary)`,
/// evaluated against the current wall clock.
pub fn score(recommendations: &[Recommendation], pricing: &PricingConfig) -> (Vec<RiskScore>, Vec<SavingsEstimate>, SavingsSummary) {
    score_at(recommendations, pricing, Utc::now())
}

/// Same contract as [`score`] but with an injectable clock, so tests can
/// pin `days_since_modified` exactly instead of racing the wall clock.
pub fn score_at(
    recommendations: &[Recommendation],
    pricing: &PricingConfig,
    now: DateTime<Utc>,
) -> (Vec<RiskScore>, Vec<SavingsEstimate>, SavingsSummary) {
    let mut scores = Vec::with_capacity(recommendations.len());
    let mut savings_details = Vec::with_capacity(recommendations.len());

    for rec in recommendations {
        let risk_score = score_one(rec, now);
        let savings = estimate_savings(rec, pricing, &risk_score);
        scores.push(risk_score);
        savings_details.push(savings);
    }

    let summary = summarize(&savings_details);
    (scores, savings_details, summary)
}

fn days_since(last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    last_modified.map(|ts| (now - ts).num_days())
}

fn reversibility(rec_type: RecommendationType) -> i32 {
    match rec_type {
        RecommendationType::ChangeStorageClass => 90,
        RecommendationType::AddLifecyclePolicy => 100,
        RecommendationType::DeleteIncompleteUpload => 100,
        RecommendationType::DeleteOldVersion => 70,
        RecommendationType::DeleteStaleObject => 0,
    }
}

fn data_loss_risk(rec_type: RecommendationType) -> i32 {
    match rec_type {
        RecommendationType::DeleteStaleObject => 100,
        RecommendationType::DeleteOldVersion => 60,
        RecommendationType::DeleteIncompleteUpload => 10,
        RecommendationType::ChangeStorageClass => 5,
        RecommendationType::AddLifecyclePolicy => 0,
    }
}

fn age_confidence(days_since_modified: Option<i64>) -> i32 {
    match days_since_modified {
        None => 35,
        Some(days) if days >= 365 => 95,
        Some(days) if days >= 180 => 80,
        Some(days) if days >= 90 => 65,
        Some(days) if days >= 30 => 45,
        Some(_) => 25,
    }
}

fn size_impact(size_bytes: u64) -> i32 {
    let gb = size_bytes as f64 / crate::config::GIB;
    if gb >= 100.0 {
        100
    } else if gb >= 10.0 {
        80
    } else if gb >= 1.0 {
        60
    } else if gb >= 0.1 {
        35
    } else {
        15
    }
}

fn access_confidence(last_modified: Option<DateTime<Utc>>, reason: &str) -> i32 {
    let base = if last_modified.is_some() { 50 } else { 35 };
    let reason_lower = reason.to_lowercase();
    let bump = if ["cold", "stale", "infrequent"].iter().any(|kw| reason_lower.contains(kw)) {
        10
    } else {
        0
    };
    (base + bump).min(100)
}

fn impact_from_savings(monthly_savings: f64) -> i32 {
    if monthly_savings >= 100.0 {
        100
    } else if monthly_savings >= 50.0 {
        80
    } else if monthly_savings >= 10.0 {
        60
    } else if monthly_savings >= 1.0 {
        40
    } else {
        20
    }
}

fn clamp100(value: f64) -> i32 {
    value.round().clamp(0.0, 100.0) as i32
}

const TEN_GIB: u64 = 10 * 1024 * 1024 * 1024;

fn score_one(rec: &Recommendation, now: DateTime<Utc>) -> RiskScore {
    let rec_type = rec.recommendation_type();
    let days = days_since(rec.last_modified, now);

    let rev = reversibility(rec_type);
    let loss = data_loss_risk(rec_type);
    let age = age_confidence(days);
    let size = size_impact(rec.size_bytes);
    let access = access_confidence(rec.last_modified, &rec.reason);

    let risk_score = clamp100(
        (100 - rev) as f64 * 0.30 + loss as f64 * 0.25 + (100 - age) as f64 * 0.20 + size as f64 * 0.15
            + (100 - access) as f64 * 0.10,
    );
    let confidence_score = clamp100((rev + age + access) as f64 / 3.0);
    let impact_score = impact_from_savings(rec.estimated_monthly_savings);

    let risk_level = RiskLevel::from_risk_score(risk_score);
    let confidence_level = ConfidenceLevel::from_confidence_score(confidence_score);

    let requires_approval =
        risk_score >= 55 || rec_type == RecommendationType::DeleteStaleObject || rec.size_bytes >= TEN_GIB;
    let safe_to_automate =
        risk_score < 30 && confidence_score >= 70 && rec_type != RecommendationType::DeleteStaleObject;

    let execution_recommendation = if safe_to_automate {
        "Safe to automate.".to_string()
    } else if requires_approval && risk_score >= 70 {
        "Manual review required.".to_string()
    } else if requires_approval {
        "Explicit approval required.".to_string()
    } else if confidence_score < 50 {
        "Collect more usage evidence.".to_string()
    } else {
        "Include in validated execution batch.".to_string()
    };

    let factors = vec![
        format!("Reversibility: {rev}/100 for {rec_type:?}"),
        format!("Data loss risk: {loss}/100 for {rec_type:?}"),
        match days {
            Some(d) => format!("Age confidence: {age}/100 ({d} days since modified)"),
            None => format!("Age confidence: {age}/100 (last_modified unknown)"),
        },
        format!("Size impact: {size}/100 ({} bytes)", rec.size_bytes),
        format!("Access confidence: {access}/100"),
    ];

    RiskScore {
        recommendation_id: rec.id,
        risk_score,
        confidence_score,
        impact_score,
        risk_level,
        confidence_level,
        safe_to_automate,
        requires_approval,
        factor_scores: FactorScores {
            reversibility: rev,
            data_loss_risk: loss,
            age_confidence: age,
            size_impact: size,
            access_confidence: access,
        },
        factors,
        execution_recommendation,
    }
}

fn estimate_savings(rec: &Recommendation, pricing: &PricingConfig, risk: &RiskScore) -> SavingsEstimate {
    let size = rec.size_bytes as f64 / crate::config::GIB;
    let from_class = rec.storage_class.as_deref().unwrap_or("STANDARD");

    let (current, projected, transition_cost, min_duration_risk, confidence, assumptions) =
        match &rec.details {
            RecommendationDetails::ChangeStorageClass { target_storage_class } => {
                let current = size * pricing.rate(from_class);
                let projected = size * pricing.rate(target_storage_class);
                let transition_cost = pricing.transition_cost(target_storage_class) / 1000.0;
                let min_duration_risk = pricing
                    .min_duration_days(target_storage_class)
                    .map(|days| projected * (days as f64 / 30.0))
                    .unwrap_or(0.0);
                let confidence = if rec.last_modified.is_some() && rec.size_bytes > 0 {
                    EstimateConfidence::High
                } else if rec.size_bytes > 0 {
                    EstimateConfidence::Medium
                } else {
                    EstimateConfidence::Low
                };
                let assumptions = vec![format!(
                    "transition from {from_class} to {target_storage_class} at current pricing"
                )];
                (current, projected, transition_cost, min_duration_risk, confidence, assumptions)
            }
            RecommendationDetails::AddLifecyclePolicy => {
                if rec.size_bytes > 0 {
                    let standard_cost = size * pricing.rate("STANDARD");
                    let glacier_ir_cost = size * pricing.rate("GLACIER_IR");
                    let current = standard_cost;
                    let projected = 0.7 * standard_cost + 0.3 * glacier_ir_cost;
                    let assumptions =
                        vec!["assumes 30% of bucket contents migrate to GLACIER_IR under the new policy".to_string()];
                    (current, projected, 0.0, 0.0, EstimateConfidence::Low, assumptions)
                } else {
                    let savings = rec.estimated_monthly_savings;
                    let assumptions = vec!["no size available; falling back to the finding's baseline estimate".to_string()];
                    (savings, 0.0, 0.0, 0.0, EstimateConfidence::Low, assumptions)
                }
            }
            RecommendationDetails::DeleteIncompleteUpload { .. } => {
                let raw = size * pricing.rate("STANDARD");
                let current = raw.max(0.01);
                let confidence = if rec.size_bytes > 0 { EstimateConfidence::Medium } else { EstimateConfidence::Low };
                (current, 0.0, 0.0, 0.0, confidence, vec!["incomplete upload parts billed at STANDARD rate".to_string()])
            }
            RecommendationDetails::DeleteStaleObject { .. } | RecommendationDetails::DeleteOldVersion { .. } => {
                let current = size * pricing.rate(from_class);
                let confidence = if rec.size_bytes > 0 { EstimateConfidence::High } else { EstimateConfidence::Medium };
                (current, 0.0, 0.0, 0.0, confidence, vec![format!("object billed at {from_class} rate until deletion")])
            }
        };

    let monthly_savings = (current - projected).max(0.0);
    let monthly_savings = crate::config::round4(monthly_savings);
    let break_even_days = if monthly_savings > 0.0 && transition_cost > 0.0 {
        Some((transition_cost / monthly_savings * 30.0).floor() as i64)
    } else {
        None
    };
    let net_first_month = crate::config::round4(monthly_savings - transition_cost);
    let net_annual_savings = crate::config::round4(monthly_savings * 12.0 - transition_cost);

    let _ = risk;

    SavingsEstimate {
        recommendation_id: rec.id,
        current_monthly_cost: crate::config::round4(current),
        projected_monthly_cost: crate::config::round4(projected),
        monthly_savings,
        transition_cost: crate::config::round4(transition_cost),
        minimum_duration_risk: crate::config::round4(min_duration_risk),
        net_first_month,
        net_annual_savings,
        break_even_days,
        estimate_confidence: confidence,
        assumptions,
    }
}

fn summarize(savings_details: &[SavingsEstimate]) -> SavingsSummary {
    let mut summary = SavingsSummary::default();
    for estimate in savings_details {
        summary.total_monthly_savings += estimate.monthly_savings;
        summary.total_annual_savings += estimate.net_annual_savings;
        summary.total_transition_costs += estimate.transition_cost;
        summary.net_first_month += estimate.net_first_month;
        summary.count += 1;
        match estimate.estimate_confidence {
            EstimateConfidence::High => summary.high_confidence_count += 1,
            EstimateConfidence::Medium => summary.medium_confidence_count += 1,
            EstimateConfidence::Low => summary.low_confidence_count += 1,
        }
    }
    summary.total_monthly_savings = crate::config::round4(summary.total_monthly_savings);
    summary.total_annual_savings = crate::config::round4(summary.total_annual_savings);
    summary.total_transition_costs = crate::config::round4(summary.total_transition_costs);
    summary.net_first_month = crate::config::round4(summary.net_first_month);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecommendationDetails;
    use chrono::Duration;
    use uuid::Uuid;

    fn archival_candidate(now: DateTime<Utc>) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            bucket: "b1".to_string(),
            key: Some("archive/a.dat".to_string()),
            risk_level: RiskLevel::Medium,
            reason: "cold object eligible for archival".to_string(),
            recommended_action: "transition to GLACIER_IR".to_string(),
            estimated_monthly_savings: 0.0190,
            size_bytes: 1_073_741_824,
            storage_class: Some("STANDARD".to_string()),
            last_modified: Some(now - Duration::days(220)),
            details: RecommendationDetails::ChangeStorageClass {
                target_storage_class: "GLACIER_IR".to_string(),
            },
        }
    }

    #[test]
    fn scenario_a_matches_spec_literal_values() {
        let now = Utc::now();
        let rec = archival_candidate(now);
        let pricing = PricingConfig::default();
        let risk = score_one(&rec, now);

        assert_eq!(risk.factor_scores.reversibility, 90);
        assert_eq!(risk.factor_scores.data_loss_risk, 5);
        assert_eq!(risk.factor_scores.age_confidence, 80);
        assert_eq!(risk.factor_scores.size_impact, 60);
        assert_eq!(risk.factor_scores.access_confidence, 60);
        assert_eq!(risk.risk_score, 21);
        assert_eq!(risk.confidence_score, 77);
        assert_eq!(risk.risk_level, RiskLevel::Low);
        assert!(risk.safe_to_automate);
        assert!(!risk.requires_approval);

        let savings = estimate_savings(&rec, &pricing, &risk);
        assert_eq!(savings.monthly_savings, 0.0190);
    }

    #[test]
    fn delete_stale_object_always_requires_approval_and_is_unsafe() {
        let now = Utc::now();
        let rec = Recommendation {
            id: Uuid::new_v4(),
            bucket: "b1".to_string(),
            key: Some("x.bin".to_string()),
            risk_level: RiskLevel::High,
            reason: "very stale object".to_string(),
            recommended_action: "delete stale object".to_string(),
            estimated_monthly_savings: 1.0,
            size_bytes: 5 * 1024 * 1024 * 1024,
            storage_class: Some("STANDARD".to_string()),
            last_modified: Some(now - Duration::days(400)),
            details: RecommendationDetails::DeleteStaleObject { prefix_aggregate: false },
        };
        let risk = score_one(&rec, now);
        assert!(risk.requires_approval);
        assert!(!risk.safe_to_automate);
    }

    #[test]
    fn risk_score_boundaries() {
        assert_eq!(RiskLevel::from_risk_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_risk_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_risk_score(59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_risk_score(60), RiskLevel::High);
    }

    #[test]
    fn size_bytes_at_10gib_forces_requires_approval() {
        let now = Utc::now();
        let mut rec = archival_candidate(now);
        rec.size_bytes = TEN_GIB - 1;
        let risk = score_one(&rec, now);
        assert!(!risk.requires_approval || risk.risk_score >= 55);

        rec.size_bytes = TEN_GIB;
        let risk = score_one(&rec, now);
        assert!(risk.requires_approval);
    }

    #[test]
    fn scoring_is_pure_and_deterministic() {
        let now = Utc::now();
        let rec = archival_candidate(now);
        let a = score_one(&rec, now);
        let b = score_one(&rec, now);
        assert_eq!(a.risk_score, b.risk_score);
        assert_eq!(a.confidence_score, b.confidence_score);
        assert_eq!(a.execution_recommendation, b.execution_recommendation);
    }
}

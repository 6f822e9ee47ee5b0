//! Loan eligibility and EMI evaluation.
//!
//! A pure, deterministic rule set; it shares no state with the answer
//! engine. Rules:
//!
//! - Interest rate from CIBIL score: ≥ 750 → 8.5 %, ≥ 700 → 10 %, else 12 %.
//! - Maximum amount: five times annual income.
//! - `loan_term` ≤ 20 is read as years, anything larger as months. Tenures
//!   beyond 480 months (40 years) are rejected as invalid.
//! - Eligible when CIBIL ≥ 650, amount and tenure are positive, and the EMI
//!   on the recommended amount is at most half of the monthly income left
//!   after a 10 % deduction per dependent (deduction capped at 50 %).
//!
//! EMI = P·r·(1+r)ⁿ / ((1+r)ⁿ − 1) with r the monthly rate, or P/n at 0 %.

use serde::{Deserialize, Serialize};

pub const MIN_CIBIL: f64 = 650.0;
pub const INCOME_MULTIPLIER: f64 = 5.0;
pub const MAX_EMI_SHARE: f64 = 0.5;
pub const DEPENDENT_DEDUCTION: f64 = 0.10;
pub const MAX_DEPENDENT_DEDUCTION: f64 = 0.50;
/// Terms up to this value are years.
pub const MAX_TERM_IN_YEARS: f64 = 20.0;
pub const MAX_TENURE_MONTHS: u32 = 480;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    /// Annual income in rupees.
    pub income_annum: f64,
    /// Requested amount in rupees.
    pub loan_amount: f64,
    /// Years when ≤ 20, months otherwise.
    pub loan_term: f64,
    pub cibil_score: f64,
    #[serde(default)]
    pub no_of_dependents: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmiRow {
    pub month: u32,
    pub emi: f64,
    pub principal: f64,
    pub interest: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityResult {
    pub eligible: bool,
    pub max_amount: f64,
    pub recommended_amount: f64,
    /// Annual percentage.
    pub interest_rate: f64,
    pub tenure_months: u32,
    pub emi: f64,
    pub emi_schedule: Vec<EmiRow>,
    /// Why the application fails; empty when eligible.
    pub reasons: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EligibilityError {
    #[error("invalid applicant profile: {0}")]
    InvalidProfile(String),
}

pub fn interest_rate_for(cibil_score: f64) -> f64 {
    if cibil_score >= 750.0 {
        8.5
    } else if cibil_score >= 700.0 {
        10.0
    } else {
        12.0
    }
}

pub fn tenure_in_months(loan_term: f64) -> u32 {
    let months = if loan_term <= MAX_TERM_IN_YEARS {
        loan_term * 12.0
    } else {
        loan_term
    };
    months.round().max(0.0) as u32
}

/// Unrounded monthly instalment.
pub fn monthly_emi(principal: f64, annual_rate: f64, months: u32) -> f64 {
    if principal <= 0.0 || months == 0 {
        return 0.0;
    }
    let n = months as f64;
    let r = annual_rate / 1200.0;
    if r == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// Month-by-month amortisation; the last row pays off the remaining balance.
pub fn amortization_schedule(principal: f64, annual_rate: f64, months: u32) -> Vec<EmiRow> {
    let emi = monthly_emi(principal, annual_rate, months);
    let r = annual_rate / 1200.0;
    let mut balance = principal;
    let mut rows = Vec::with_capacity(months as usize);

    for month in 1..=months {
        let interest = balance * r;
        let principal_part = if month == months {
            balance
        } else {
            (emi - interest).min(balance)
        };
        balance -= principal_part;
        rows.push(EmiRow {
            month,
            emi: round2(principal_part + interest),
            principal: round2(principal_part),
            interest: round2(interest),
            balance: round2(balance.max(0.0)),
        });
    }
    rows
}

pub fn evaluate(profile: &ApplicantProfile) -> Result<EligibilityResult, EligibilityError> {
    validate(profile)?;

    let interest_rate = interest_rate_for(profile.cibil_score);
    let max_amount = profile.income_annum * INCOME_MULTIPLIER;
    let tenure_months = tenure_in_months(profile.loan_term);
    let candidate = profile.loan_amount.min(max_amount);

    let deduction =
        (DEPENDENT_DEDUCTION * profile.no_of_dependents as f64).min(MAX_DEPENDENT_DEDUCTION);
    let disposable_monthly = profile.income_annum / 12.0 * (1.0 - deduction);
    let affordable_emi = disposable_monthly * MAX_EMI_SHARE;
    let candidate_emi = monthly_emi(candidate, interest_rate, tenure_months);

    let mut reasons = Vec::new();
    if profile.cibil_score < MIN_CIBIL {
        reasons.push(format!(
            "CIBIL score {} is below the minimum of {}",
            profile.cibil_score, MIN_CIBIL
        ));
    }
    if profile.loan_amount <= 0.0 {
        reasons.push("requested amount must be positive".to_string());
    }
    if tenure_months == 0 {
        reasons.push("loan term must be positive".to_string());
    }
    if candidate > 0.0 && !candidate_emi.is_finite() {
        reasons.push("EMI cannot be computed for this amount and tenure".to_string());
    } else if candidate > 0.0 && candidate_emi > affordable_emi {
        reasons.push(format!(
            "EMI {:.2} exceeds {:.0}% of monthly disposable income ({:.2})",
            candidate_emi,
            MAX_EMI_SHARE * 100.0,
            affordable_emi
        ));
    }

    let eligible = reasons.is_empty();
    let recommended_amount = if eligible { candidate } else { 0.0 };
    let (emi, emi_schedule) = if eligible {
        (
            round2(monthly_emi(recommended_amount, interest_rate, tenure_months)),
            amortization_schedule(recommended_amount, interest_rate, tenure_months),
        )
    } else {
        (0.0, Vec::new())
    };

    Ok(EligibilityResult {
        eligible,
        max_amount: round2(max_amount),
        recommended_amount: round2(recommended_amount),
        interest_rate,
        tenure_months,
        emi,
        emi_schedule,
        reasons,
    })
}

fn validate(profile: &ApplicantProfile) -> Result<(), EligibilityError> {
    let fields = [
        ("income_annum", profile.income_annum),
        ("loan_amount", profile.loan_amount),
        ("loan_term", profile.loan_term),
        ("cibil_score", profile.cibil_score),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(EligibilityError::InvalidProfile(format!("{} is not a number", name)));
        }
        if value < 0.0 {
            return Err(EligibilityError::InvalidProfile(format!("{} is negative", name)));
        }
    }
    if !(300.0..=900.0).contains(&profile.cibil_score) {
        return Err(EligibilityError::InvalidProfile(
            "cibil_score must be between 300 and 900".to_string(),
        ));
    }
    if tenure_in_months(profile.loan_term) > MAX_TENURE_MONTHS {
        return Err(EligibilityError::InvalidProfile(format!(
            "loan_term exceeds {} months",
            MAX_TENURE_MONTHS
        )));
    }
    Ok(())
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

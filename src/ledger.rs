use serde::Serialize;

pub const MAX_MARKS_PER_SUBJECT: f64 = 100.0;
pub const PASS_MARK: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKind {
    Full,
    Partial,
}

impl PaymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentKind::Full => "full",
            PaymentKind::Partial => "partial",
        }
    }
}

/// Result of reconciling one payment against a student's running balances.
///
/// The transaction fields describe what this payment alone left owing or in
/// credit; the `new_*` fields are the student's balances afterwards. At most
/// one of `new_outstanding` / `new_extra` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub effective_due: f64,
    pub transaction_outstanding: f64,
    pub transaction_extra: f64,
    pub new_outstanding: f64,
    pub new_extra: f64,
}

impl PaymentOutcome {
    pub fn kind(&self, amount: f64) -> PaymentKind {
        if amount >= self.effective_due {
            PaymentKind::Full
        } else {
            PaymentKind::Partial
        }
    }
}

/// Apply one payment. Previous extra credit is consumed against the due
/// amount first; a shortfall accumulates onto the previous outstanding, an
/// overpayment replaces the balances with a fresh extra credit.
pub fn apply_payment(
    total_due: f64,
    prev_outstanding: f64,
    prev_extra: f64,
    amount: f64,
) -> PaymentOutcome {
    let effective_due = (total_due - prev_extra).max(0.0);
    let difference = amount - effective_due;

    if difference < 0.0 {
        PaymentOutcome {
            effective_due,
            transaction_outstanding: -difference,
            transaction_extra: 0.0,
            new_outstanding: prev_outstanding - difference,
            new_extra: 0.0,
        }
    } else {
        PaymentOutcome {
            effective_due,
            transaction_outstanding: 0.0,
            transaction_extra: difference,
            new_outstanding: 0.0,
            new_extra: difference,
        }
    }
}

/// Total shown on a fee invoice: current fees plus carried-over outstanding,
/// less any extra credit, floored at zero.
pub fn invoice_total(school_fee: f64, bus_fee: f64, outstanding: f64, extra: f64) -> f64 {
    (school_fee + bus_fee + outstanding - extra).max(0.0)
}

pub fn grade_for(marks: f64) -> &'static str {
    if marks >= 90.0 {
        "A+"
    } else if marks >= 80.0 {
        "A"
    } else if marks >= 70.0 {
        "B"
    } else if marks >= 60.0 {
        "C"
    } else if marks >= 50.0 {
        "D"
    } else if marks >= PASS_MARK {
        "E"
    } else {
        "F"
    }
}

pub fn is_pass(marks: f64) -> bool {
    marks >= PASS_MARK
}

fn remarks_for(percentage: f64) -> &'static str {
    if percentage >= 90.0 {
        "Outstanding! Keep up the excellent work."
    } else if percentage >= 80.0 {
        "Excellent. Continue to strive for greatness."
    } else if percentage >= 70.0 {
        "Good. Focus on consistency."
    } else if percentage >= 60.0 {
        "Satisfactory. Work on weak areas."
    } else if percentage >= 50.0 {
        "Needs improvement. Seek help."
    } else if percentage >= 40.0 {
        "Below average. Extra effort needed."
    } else {
        "Unsatisfactory. Immediate attention needed."
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub total_marks: f64,
    pub max_marks: f64,
    pub percentage: f64,
    pub grade: &'static str,
    pub remarks: &'static str,
}

/// Overall summary over per-subject marks, each out of 100.
pub fn summarize_results(marks: &[f64]) -> ResultSummary {
    let total_marks: f64 = marks.iter().sum();
    let max_marks = MAX_MARKS_PER_SUBJECT * marks.len() as f64;
    let percentage = if max_marks > 0.0 {
        100.0 * total_marks / max_marks
    } else {
        0.0
    };
    ResultSummary {
        total_marks,
        max_marks,
        percentage,
        grade: grade_for(percentage),
        remarks: remarks_for(percentage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_money_eq(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {} ~= {}", a, b);
    }

    #[test]
    fn underpayment_becomes_outstanding() {
        let out = apply_payment(1700.0, 0.0, 0.0, 1000.0);
        assert_money_eq(out.effective_due, 1700.0);
        assert_money_eq(out.transaction_outstanding, 700.0);
        assert_money_eq(out.transaction_extra, 0.0);
        assert_money_eq(out.new_outstanding, 700.0);
        assert_money_eq(out.new_extra, 0.0);
        assert_eq!(out.kind(1000.0), PaymentKind::Partial);
    }

    #[test]
    fn overpayment_becomes_extra() {
        let out = apply_payment(1700.0, 0.0, 0.0, 2000.0);
        assert_money_eq(out.transaction_extra, 300.0);
        assert_money_eq(out.new_extra, 300.0);
        assert_money_eq(out.new_outstanding, 0.0);
        assert_eq!(out.kind(2000.0), PaymentKind::Full);
    }

    #[test]
    fn exact_payment_clears_both_balances() {
        let out = apply_payment(1700.0, 500.0, 0.0, 1700.0);
        assert_money_eq(out.transaction_outstanding, 0.0);
        assert_money_eq(out.transaction_extra, 0.0);
        assert_money_eq(out.new_outstanding, 0.0);
        assert_money_eq(out.new_extra, 0.0);
        assert_eq!(out.kind(1700.0), PaymentKind::Full);
    }

    #[test]
    fn prior_extra_reduces_effective_due() {
        let out = apply_payment(1700.0, 0.0, 300.0, 1400.0);
        assert_money_eq(out.effective_due, 1400.0);
        assert_money_eq(out.new_outstanding, 0.0);
        assert_money_eq(out.new_extra, 0.0);
        assert_eq!(out.kind(1400.0), PaymentKind::Full);
    }

    #[test]
    fn prior_extra_larger_than_due_floors_at_zero() {
        let out = apply_payment(500.0, 0.0, 800.0, 0.0);
        assert_money_eq(out.effective_due, 0.0);
        assert_money_eq(out.new_extra, 0.0);
        assert_money_eq(out.new_outstanding, 0.0);
    }

    #[test]
    fn shortfall_accumulates_on_previous_outstanding() {
        let out = apply_payment(1000.0, 400.0, 0.0, 600.0);
        assert_money_eq(out.transaction_outstanding, 400.0);
        assert_money_eq(out.new_outstanding, 800.0);
        assert_money_eq(out.new_extra, 0.0);
    }

    #[test]
    fn balances_stay_mutually_exclusive_over_a_sequence() {
        let payments = [
            (1700.0, 900.0),
            (1700.0, 2600.0),
            (1700.0, 1600.0),
            (1700.0, 1700.0),
        ];
        let mut outstanding = 0.0;
        let mut extra = 0.0;
        for (due, amount) in payments {
            let out = apply_payment(due, outstanding, extra, amount);
            outstanding = out.new_outstanding;
            extra = out.new_extra;
            assert!(
                outstanding == 0.0 || extra == 0.0,
                "both balances non-zero: outstanding={} extra={}",
                outstanding,
                extra
            );
        }
    }

    #[test]
    fn invoice_total_adjusts_for_balances() {
        assert_money_eq(invoice_total(1200.0, 500.0, 0.0, 0.0), 1700.0);
        assert_money_eq(invoice_total(1200.0, 500.0, 300.0, 0.0), 2000.0);
        assert_money_eq(invoice_total(1200.0, 500.0, 0.0, 400.0), 1300.0);
        assert_money_eq(invoice_total(0.0, 0.0, 0.0, 900.0), 0.0);
    }

    #[test]
    fn grade_bands() {
        assert_eq!(grade_for(95.0), "A+");
        assert_eq!(grade_for(90.0), "A+");
        assert_eq!(grade_for(89.9), "A");
        assert_eq!(grade_for(70.0), "B");
        assert_eq!(grade_for(60.0), "C");
        assert_eq!(grade_for(50.0), "D");
        assert_eq!(grade_for(40.0), "E");
        assert_eq!(grade_for(39.9), "F");
        assert!(is_pass(40.0));
        assert!(!is_pass(39.0));
    }

    #[test]
    fn result_summary_percentage_and_remarks() {
        let summary = summarize_results(&[80.0, 90.0, 70.0, 60.0]);
        assert_money_eq(summary.total_marks, 300.0);
        assert_money_eq(summary.max_marks, 400.0);
        assert_money_eq(summary.percentage, 75.0);
        assert_eq!(summary.grade, "B");
        assert_eq!(summary.remarks, "Good. Focus on consistency.");

        let empty = summarize_results(&[]);
        assert_money_eq(empty.percentage, 0.0);
        assert_eq!(empty.grade, "F");
    }
}

//! Payment allocation and refund reversal planning.
//!
//! Both planners are pure: they read snapshots of charges/allocations and
//! return the writes the service should make.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{LedgerError, LedgerResult};
use crate::config::AllocationStrategy;
use crate::models::{parse_timestamp, PaymentAllocation, ServiceCharge};

/// One planned allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub charge_id: String,
    pub amount_cents: i64,
}

/// How a payment is split across charges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub lines: Vec<AllocationLine>,
    /// Left on the payment as patient credit
    pub unallocated_cents: i64,
}

impl AllocationPlan {
    pub fn allocated_cents(&self) -> i64 {
        self.lines.iter().map(|l| l.amount_cents).sum()
    }
}

/// Plan how `amount_cents` received for `patient_id` settles `charges`.
///
/// With `targets`, only those charges are settled, in the given order.
/// A target that is missing from `charges`, voided or billed to another
/// patient fails the whole plan; a fully paid target is skipped.
/// Without targets, every outstanding charge of the patient is eligible and
/// `strategy` decides the order.
pub fn plan_allocation(
    amount_cents: i64,
    patient_id: &str,
    charges: &[ServiceCharge],
    targets: &[String],
    received_at: &str,
    strategy: AllocationStrategy,
) -> LedgerResult<AllocationPlan> {
    if amount_cents <= 0 {
        return Err(LedgerError::Validation(format!(
            "allocation amount must be positive, got {}",
            amount_cents
        )));
    }

    let ordered: Vec<&ServiceCharge> = if targets.is_empty() {
        order_by_strategy(patient_id, charges, received_at, strategy)?
    } else {
        resolve_targets(patient_id, charges, targets)?
    };

    // Repeated targets must not settle the same balance twice
    let mut remaining: HashMap<&str, i64> = HashMap::new();
    let mut left = amount_cents;
    let mut lines: Vec<AllocationLine> = Vec::new();

    for charge in ordered {
        if left == 0 {
            break;
        }
        let outstanding = remaining
            .entry(charge.charge_id.as_str())
            .or_insert_with(|| charge.outstanding_cents());
        let take = left.min(*outstanding);
        if take <= 0 {
            continue;
        }
        *outstanding -= take;
        left -= take;

        match lines.iter_mut().find(|l| l.charge_id == charge.charge_id) {
            Some(line) => line.amount_cents += take,
            None => lines.push(AllocationLine {
                charge_id: charge.charge_id.clone(),
                amount_cents: take,
            }),
        }
    }

    Ok(AllocationPlan {
        lines,
        unallocated_cents: left,
    })
}

fn resolve_targets<'c>(
    patient_id: &str,
    charges: &'c [ServiceCharge],
    targets: &[String],
) -> LedgerResult<Vec<&'c ServiceCharge>> {
    targets
        .iter()
        .map(|target| {
            let charge = charges
                .iter()
                .find(|c| &c.charge_id == target)
                .ok_or_else(|| LedgerError::NotFound(format!("charge {}", target)))?;
            if charge.patient_id != patient_id {
                return Err(LedgerError::Validation(format!(
                    "charge {} belongs to another patient",
                    target
                )));
            }
            if charge.is_voided() {
                return Err(LedgerError::InvalidState(format!(
                    "charge {} is voided",
                    target
                )));
            }
            Ok(charge)
        })
        .collect()
}

fn order_by_strategy<'c>(
    patient_id: &str,
    charges: &'c [ServiceCharge],
    received_at: &str,
    strategy: AllocationStrategy,
) -> LedgerResult<Vec<&'c ServiceCharge>> {
    let mut eligible: Vec<&ServiceCharge> = charges
        .iter()
        .filter(|c| c.patient_id == patient_id && c.outstanding_cents() > 0)
        .collect();

    match strategy {
        AllocationStrategy::OldestFirst => {
            eligible.sort_by(|a, b| a.charged_at.cmp(&b.charged_at));
        }
        AllocationStrategy::NearestDate => {
            let received = parse_timestamp(received_at)?;
            let mut keyed = eligible
                .into_iter()
                .map(|c| {
                    let charged = parse_timestamp(&c.charged_at)?;
                    let distance = (received - charged).num_milliseconds().abs();
                    Ok((distance, charged, c))
                })
                .collect::<LedgerResult<Vec<_>>>()?;
            // Ties go to the older charge
            keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
            eligible = keyed.into_iter().map(|(_, _, c)| c).collect();
        }
    }

    Ok(eligible)
}

/// One allocation to shrink when refunding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalLine {
    pub allocation_id: String,
    pub charge_id: String,
    pub amount_cents: i64,
}

/// How a refund is funded from a payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalPlan {
    /// Taken from the payment's unapplied credit
    pub from_unallocated_cents: i64,
    pub lines: Vec<ReversalLine>,
}

impl ReversalPlan {
    pub fn reversed_cents(&self) -> i64 {
        self.lines.iter().map(|l| l.amount_cents).sum()
    }
}

/// Plan a refund of `refund_cents` from a payment.
///
/// Unapplied credit is returned first; after that allocations are undone in
/// the order given, which callers pass newest first.
pub fn plan_reversal(
    refund_cents: i64,
    unallocated_cents: i64,
    allocations_newest_first: &[PaymentAllocation],
) -> LedgerResult<ReversalPlan> {
    if refund_cents <= 0 {
        return Err(LedgerError::Validation(format!(
            "refund amount must be positive, got {}",
            refund_cents
        )));
    }

    let allocated: i64 = allocations_newest_first.iter().map(|a| a.amount_cents).sum();
    let available = unallocated_cents.max(0) + allocated;
    if refund_cents > available {
        return Err(LedgerError::OverAllocation(format!(
            "refund of {} exceeds refundable {}",
            refund_cents, available
        )));
    }

    let from_unallocated = refund_cents.min(unallocated_cents.max(0));
    let mut left = refund_cents - from_unallocated;
    let mut lines = Vec::new();

    for allocation in allocations_newest_first {
        if left == 0 {
            break;
        }
        let take = left.min(allocation.amount_cents);
        if take <= 0 {
            continue;
        }
        left -= take;
        lines.push(ReversalLine {
            allocation_id: allocation.allocation_id.clone(),
            charge_id: allocation.charge_id.clone(),
            amount_cents: take,
        });
    }

    Ok(ReversalPlan {
        from_unallocated_cents: from_unallocated,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChargeKind, ChargeSource, ChargeStatus};

    fn charge(id: &str, patient: &str, amount: i64, charged_at: &str) -> ServiceCharge {
        let mut c = ServiceCharge::new(
            patient.into(),
            ChargeSource::new(ChargeKind::Other, None),
            format!("charge {}", id),
            amount,
            "user-1".into(),
        );
        c.charge_id = id.into();
        c.charged_at = charged_at.into();
        c
    }

    fn alloc(id: &str, charge_id: &str, amount: i64) -> PaymentAllocation {
        let mut a = PaymentAllocation::new("pay-1".into(), charge_id.into(), amount);
        a.allocation_id = id.into();
        a
    }

    const T1: &str = "2024-03-01T09:00:00.000Z";
    const T2: &str = "2024-03-05T09:00:00.000Z";
    const T3: &str = "2024-03-09T09:00:00.000Z";

    #[test]
    fn test_oldest_first() {
        let charges = vec![
            charge("c2", "p1", 3000, T2),
            charge("c1", "p1", 2000, T1),
            charge("c3", "p1", 5000, T3),
        ];

        let plan =
            plan_allocation(4000, "p1", &charges, &[], T3, AllocationStrategy::OldestFirst)
                .unwrap();

        assert_eq!(
            plan.lines,
            vec![
                AllocationLine { charge_id: "c1".into(), amount_cents: 2000 },
                AllocationLine { charge_id: "c2".into(), amount_cents: 2000 },
            ]
        );
        assert_eq!(plan.unallocated_cents, 0);
    }

    #[test]
    fn test_nearest_date() {
        let charges = vec![
            charge("c1", "p1", 2000, T1),
            charge("c2", "p1", 3000, T2),
            charge("c3", "p1", 5000, T3),
        ];

        let plan = plan_allocation(
            6000,
            "p1",
            &charges,
            &[],
            "2024-03-08T09:00:00.000Z",
            AllocationStrategy::NearestDate,
        )
        .unwrap();

        assert_eq!(plan.lines[0].charge_id, "c3");
        assert_eq!(plan.lines[0].amount_cents, 5000);
        assert_eq!(plan.lines[1].charge_id, "c2");
        assert_eq!(plan.lines[1].amount_cents, 1000);
    }

    #[test]
    fn test_nearest_date_tie_goes_to_older() {
        let charges = vec![
            charge("later", "p1", 1000, T3),
            charge("earlier", "p1", 1000, T1),
        ];

        let plan =
            plan_allocation(1000, "p1", &charges, &[], T2, AllocationStrategy::NearestDate)
                .unwrap();

        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].charge_id, "earlier");
    }

    #[test]
    fn test_overpayment_leaves_credit() {
        let charges = vec![charge("c1", "p1", 2000, T1)];
        let plan =
            plan_allocation(2500, "p1", &charges, &[], T2, AllocationStrategy::OldestFirst)
                .unwrap();
        assert_eq!(plan.allocated_cents(), 2000);
        assert_eq!(plan.unallocated_cents, 500);
    }

    #[test]
    fn test_skips_settled_voided_and_foreign_charges() {
        let mut paid = charge("paid", "p1", 1000, T1);
        paid.apply_allocation_delta(1000);
        let mut voided = charge("voided", "p1", 1000, T1);
        voided.status = ChargeStatus::Voided;
        let foreign = charge("foreign", "p2", 1000, T1);
        let open = charge("open", "p1", 1000, T2);

        let plan = plan_allocation(
            5000,
            "p1",
            &[paid, voided, foreign, open],
            &[],
            T3,
            AllocationStrategy::OldestFirst,
        )
        .unwrap();

        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].charge_id, "open");
        assert_eq!(plan.unallocated_cents, 4000);
    }

    #[test]
    fn test_explicit_targets_in_order() {
        let charges = vec![
            charge("c1", "p1", 2000, T1),
            charge("c2", "p1", 3000, T2),
        ];
        let targets = vec!["c2".to_string(), "c1".to_string()];

        let plan =
            plan_allocation(4000, "p1", &charges, &targets, T3, AllocationStrategy::OldestFirst)
                .unwrap();

        assert_eq!(plan.lines[0].charge_id, "c2");
        assert_eq!(plan.lines[0].amount_cents, 3000);
        assert_eq!(plan.lines[1].charge_id, "c1");
        assert_eq!(plan.lines[1].amount_cents, 1000);
    }

    #[test]
    fn test_repeated_target_not_double_counted() {
        let charges = vec![charge("c1", "p1", 2000, T1)];
        let targets = vec!["c1".to_string(), "c1".to_string()];

        let plan =
            plan_allocation(5000, "p1", &charges, &targets, T3, AllocationStrategy::OldestFirst)
                .unwrap();

        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].amount_cents, 2000);
        assert_eq!(plan.unallocated_cents, 3000);
    }

    #[test]
    fn test_settled_target_skipped() {
        let mut paid = charge("c1", "p1", 2000, T1);
        paid.apply_allocation_delta(2000);
        let open = charge("c2", "p1", 1000, T2);
        let targets = vec!["c1".to_string(), "c2".to_string()];

        let plan = plan_allocation(
            1000,
            "p1",
            &[paid, open],
            &targets,
            T3,
            AllocationStrategy::OldestFirst,
        )
        .unwrap();

        assert_eq!(plan.lines, vec![AllocationLine { charge_id: "c2".into(), amount_cents: 1000 }]);
    }

    #[test]
    fn test_bad_targets_rejected() {
        let mut voided = charge("voided", "p1", 1000, T1);
        voided.status = ChargeStatus::Voided;
        let charges = vec![voided, charge("foreign", "p2", 1000, T1)];

        let unknown = plan_allocation(
            100,
            "p1",
            &charges,
            &["missing".to_string()],
            T2,
            AllocationStrategy::OldestFirst,
        );
        assert!(matches!(unknown, Err(LedgerError::NotFound(_))));

        let foreign = plan_allocation(
            100,
            "p1",
            &charges,
            &["foreign".to_string()],
            T2,
            AllocationStrategy::OldestFirst,
        );
        assert!(matches!(foreign, Err(LedgerError::Validation(_))));

        let voided = plan_allocation(
            100,
            "p1",
            &charges,
            &["voided".to_string()],
            T2,
            AllocationStrategy::OldestFirst,
        );
        assert!(matches!(voided, Err(LedgerError::InvalidState(_))));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let result = plan_allocation(0, "p1", &[], &[], T1, AllocationStrategy::OldestFirst);
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_reversal_uses_credit_first() {
        let allocations = vec![alloc("a2", "c2", 3000), alloc("a1", "c1", 2000)];

        let plan = plan_reversal(4000, 500, &allocations).unwrap();

        assert_eq!(plan.from_unallocated_cents, 500);
        assert_eq!(
            plan.lines,
            vec![
                ReversalLine {
                    allocation_id: "a2".into(),
                    charge_id: "c2".into(),
                    amount_cents: 3000
                },
                ReversalLine {
                    allocation_id: "a1".into(),
                    charge_id: "c1".into(),
                    amount_cents: 500
                },
            ]
        );
    }

    #[test]
    fn test_reversal_within_credit_touches_no_allocations() {
        let plan = plan_reversal(300, 500, &[alloc("a1", "c1", 2000)]).unwrap();
        assert_eq!(plan.from_unallocated_cents, 300);
        assert!(plan.lines.is_empty());
    }

    #[test]
    fn test_reversal_exceeding_payment_rejected() {
        let result = plan_reversal(3000, 500, &[alloc("a1", "c1", 2000)]);
        assert!(matches!(result, Err(LedgerError::OverAllocation(_))));
    }
}

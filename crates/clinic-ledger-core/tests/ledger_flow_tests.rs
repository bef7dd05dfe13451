//! End-to-end ledger scenarios across charges, payments and shifts.

use clinic_ledger_core::config::LedgerConfig;
use clinic_ledger_core::db::Database;
use clinic_ledger_core::export::{ShiftReportExporter, StatementExporter};
use clinic_ledger_core::ledger::{
    AdmissionRequest, ChargeRequest, ClinicLedger, FertilityCaseRequest, LedgerError, NewPatient,
    PathologyRequest, PaymentRequest,
};
use clinic_ledger_core::models::{
    AdmissionStatus, CaseStatus, ChargeKind, ChargeStatus, FertilityTreatment, MovementKind,
    PathologyStatus, Patient, PaymentMethod, Priority, Role, User, VarianceStatus,
};

struct Staff {
    admin: User,
    cashier: User,
    doctor: User,
}

fn setup(ledger: &ClinicLedger<'_>) -> Staff {
    let admin = ledger.bootstrap_admin("admin", "Clinic Admin").unwrap();
    let cashier = ledger
        .create_user(&admin.user_id, "wanjiru", "Wanjiru K.", Role::Cashier)
        .unwrap();
    let doctor = ledger
        .create_user(&admin.user_id, "dr_mwangi", "Dr. Mwangi", Role::Doctor)
        .unwrap();
    Staff {
        admin,
        cashier,
        doctor,
    }
}

fn register(ledger: &ClinicLedger<'_>, actor: &User, first: &str, last: &str) -> Patient {
    ledger
        .register_patient(
            &actor.user_id,
            NewPatient {
                first_name: first.into(),
                last_name: last.into(),
                date_of_birth: Some("1990-04-12".into()),
                ..NewPatient::default()
            },
        )
        .unwrap()
        .patient
}

fn payment(patient: &Patient, method: PaymentMethod, amount: i64, targets: Vec<String>) -> PaymentRequest {
    PaymentRequest {
        patient_id: patient.patient_id.clone(),
        method,
        amount_cents: amount,
        reference: None,
        target_charge_ids: targets,
    }
}

#[test]
fn test_front_desk_day() {
    let db = Database::open_in_memory().unwrap();
    let config = LedgerConfig::default();
    let ledger = ClinicLedger::new(&db, &config);
    let staff = setup(&ledger);
    let patient = register(&ledger, &staff.cashier, "Amina", "Otieno");

    let consult = ledger
        .post_charge(
            &staff.doctor.user_id,
            ChargeRequest {
                patient_id: patient.patient_id.clone(),
                kind: ChargeKind::Consultation,
                description: "GP consultation".into(),
                amount_cents: 2_000,
                reference_id: None,
            },
        )
        .unwrap();
    let order = ledger
        .order_pathology_test(
            &staff.doctor.user_id,
            PathologyRequest {
                patient_id: patient.patient_id.clone(),
                admission_id: None,
                test_code: "FBC".into(),
                test_name: "Full blood count".into(),
                priority: Priority::Routine,
                price_cents: 1_500,
            },
        )
        .unwrap();
    let lab_charge_id = order.charge_id.clone().unwrap();

    let shift = ledger.open_shift(&staff.cashier.user_id, 10_000).unwrap();

    // Cash settles the consultation, then part of the lab test
    let cash = ledger
        .record_payment(
            &staff.cashier.user_id,
            payment(
                &patient,
                PaymentMethod::Cash,
                3_000,
                vec![consult.charge_id.clone(), lab_charge_id.clone()],
            ),
        )
        .unwrap();
    assert_eq!(cash.allocations.len(), 2);
    assert_eq!(cash.allocations[0].charge_id, consult.charge_id);
    assert_eq!(cash.allocations[0].amount_cents, 2_000);
    assert_eq!(cash.allocations[1].amount_cents, 1_000);
    assert_eq!(cash.payment.shift_id.as_deref(), Some(shift.shift_id.as_str()));

    let card = ledger
        .record_payment(
            &staff.cashier.user_id,
            payment(&patient, PaymentMethod::Card, 500, vec![]),
        )
        .unwrap();
    assert_eq!(card.allocations.len(), 1);
    assert_eq!(card.allocations[0].charge_id, lab_charge_id);

    let settled = ledger.patient_balance(&patient.patient_id).unwrap();
    assert_eq!(settled.total_charged_cents, 3_500);
    assert_eq!(settled.outstanding_cents, 0);
    assert_eq!(settled.credit_cents, 0);

    // Refund unwinds the newest allocation of the cash payment (the lab test)
    let refund = ledger
        .refund_payment(&staff.cashier.user_id, &cash.payment.payment_id, 1_000, "Test repeated free")
        .unwrap();
    assert_eq!(refund.from_unallocated_cents, 0);
    assert_eq!(refund.reversed.len(), 1);
    assert_eq!(refund.reversed[0].charge_id, lab_charge_id);
    assert_eq!(refund.refund.shift_id.as_deref(), Some(shift.shift_id.as_str()));

    let lab_charge = db.get_charge(&lab_charge_id).unwrap().unwrap();
    assert_eq!(lab_charge.outstanding_cents(), 1_000);
    assert_eq!(lab_charge.status, ChargeStatus::PartiallyPaid);

    ledger
        .record_cash_movement(
            &staff.cashier.user_id,
            &shift.shift_id,
            MovementKind::PayOut,
            500,
            "Courier for samples",
        )
        .unwrap();

    let summary = ledger.shift_summary(&shift.shift_id).unwrap();
    assert_eq!(summary.expected_cash_cents, 10_000 + 3_000 - 1_000 - 500);
    assert_eq!(summary.payment_count, 2);
    assert_eq!(summary.refund_count, 1);
    assert_eq!(summary.movement_count, 1);
    let cash_total = summary
        .method_totals
        .iter()
        .find(|t| t.method == PaymentMethod::Cash)
        .unwrap();
    assert_eq!(cash_total.net_cents(), 2_000);

    // 600 short is above the note threshold
    let err = ledger
        .close_shift(&staff.cashier.user_id, &shift.shift_id, 10_900, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let closed = ledger
        .close_shift(
            &staff.cashier.user_id,
            &shift.shift_id,
            10_900,
            Some("Counted twice, short".into()),
        )
        .unwrap();
    assert!(!closed.is_open());
    assert_eq!(closed.expected_cash_cents, Some(11_500));
    assert_eq!(closed.variance_cents, Some(-600));
    assert_eq!(closed.variance_status, Some(VarianceStatus::Short));

    // Closed shifts take no more cash
    let err = ledger
        .record_payment(
            &staff.cashier.user_id,
            payment(&patient, PaymentMethod::Cash, 1_000, vec![]),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    let report = ShiftReportExporter::new(&db, &config)
        .export(&shift.shift_id)
        .unwrap();
    assert_eq!(report.payments.len(), 2);
    assert_eq!(report.refunds.len(), 1);
    assert_eq!(report.movements.len(), 1);
    assert!(report.to_csv().contains(&shift.shift_id));

    let statement = StatementExporter::new(&db, &config)
        .export(&patient.patient_id)
        .unwrap();
    assert_eq!(statement.balance.outstanding_cents, 1_000);
    assert_eq!(statement.charges.len(), 2);

    // The admin was never involved in cash handling
    assert!(db.get_open_shift(&staff.admin.user_id).unwrap().is_none());
}

#[test]
fn test_overpayment_becomes_credit_and_is_applied_later() {
    let db = Database::open_in_memory().unwrap();
    let config = LedgerConfig::default();
    let ledger = ClinicLedger::new(&db, &config);
    let staff = setup(&ledger);
    let patient = register(&ledger, &staff.cashier, "Brian", "Kiptoo");

    let deposit = ledger
        .record_payment(
            &staff.cashier.user_id,
            payment(&patient, PaymentMethod::MobileMoney, 5_000, vec![]),
        )
        .unwrap();
    assert!(deposit.allocations.is_empty());
    assert_eq!(deposit.payment.unallocated_cents(), 5_000);
    assert!(deposit.payment.shift_id.is_none());

    let balance = ledger.patient_balance(&patient.patient_id).unwrap();
    assert_eq!(balance.credit_cents, 5_000);
    assert_eq!(balance.net_due_cents(), -5_000);

    ledger
        .post_charge(
            &staff.doctor.user_id,
            ChargeRequest {
                patient_id: patient.patient_id.clone(),
                kind: ChargeKind::Pharmacy,
                description: "Antibiotics".into(),
                amount_cents: 3_200,
                reference_id: None,
            },
        )
        .unwrap();

    let applied = ledger
        .apply_credit(&staff.cashier.user_id, &patient.patient_id)
        .unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].amount_cents, 3_200);

    let balance = ledger.patient_balance(&patient.patient_id).unwrap();
    assert_eq!(balance.outstanding_cents, 0);
    assert_eq!(balance.credit_cents, 1_800);

    // Refund takes the unapplied credit before reopening the pharmacy charge
    let refund = ledger
        .refund_payment(&staff.cashier.user_id, &deposit.payment.payment_id, 2_000, "Patient request")
        .unwrap();
    assert_eq!(refund.from_unallocated_cents, 1_800);
    assert_eq!(refund.reversed.iter().map(|l| l.amount_cents).sum::<i64>(), 200);

    let balance = ledger.patient_balance(&patient.patient_id).unwrap();
    assert_eq!(balance.outstanding_cents, 200);
    assert_eq!(balance.credit_cents, 0);
}

#[test]
fn test_large_refund_needs_supervisor() {
    let db = Database::open_in_memory().unwrap();
    let config = LedgerConfig::default();
    let ledger = ClinicLedger::new(&db, &config);
    let staff = setup(&ledger);
    let patient = register(&ledger, &staff.cashier, "Grace", "Njeri");

    let paid = ledger
        .record_payment(
            &staff.cashier.user_id,
            payment(&patient, PaymentMethod::BankTransfer, 50_000, vec![]),
        )
        .unwrap();

    let err = ledger
        .refund_payment(&staff.cashier.user_id, &paid.payment.payment_id, 20_000, "Duplicate transfer")
        .unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied(_)));

    let manager = ledger
        .create_user(&staff.admin.user_id, "ops", "Ops Manager", Role::Manager)
        .unwrap();
    ledger
        .refund_payment(&manager.user_id, &paid.payment.payment_id, 20_000, "Duplicate transfer")
        .unwrap();

    let err = ledger
        .refund_payment(&manager.user_id, &paid.payment.payment_id, 30_001, "Too much")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn test_supervisor_closes_someone_elses_shift() {
    let db = Database::open_in_memory().unwrap();
    let config = LedgerConfig::default();
    let ledger = ClinicLedger::new(&db, &config);
    let staff = setup(&ledger);
    let other = ledger
        .create_user(&staff.admin.user_id, "otieno", "Night Desk", Role::Receptionist)
        .unwrap();

    let shift = ledger.open_shift(&other.user_id, 2_000).unwrap();
    assert!(matches!(
        ledger.open_shift(&other.user_id, 0),
        Err(LedgerError::InvalidState(_))
    ));

    // A cashier cannot close a colleague's drawer
    let err = ledger
        .close_shift(&staff.cashier.user_id, &shift.shift_id, 2_000, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied(_)));

    let closed = ledger
        .close_shift(&staff.admin.user_id, &shift.shift_id, 2_050, None)
        .unwrap();
    assert_eq!(closed.variance_status, Some(VarianceStatus::Over));
    assert_eq!(closed.closed_by.as_deref(), Some(staff.admin.user_id.as_str()));

    // Shift is closed, so the owner may open a new one
    ledger.open_shift(&other.user_id, 0).unwrap();
}

#[test]
fn test_admission_lifecycle_bills_stay() {
    let db = Database::open_in_memory().unwrap();
    let config = LedgerConfig::default();
    let ledger = ClinicLedger::new(&db, &config);
    let staff = setup(&ledger);
    let patient = register(&ledger, &staff.cashier, "Joseph", "Kamau");

    let request = AdmissionRequest {
        patient_id: patient.patient_id.clone(),
        ward: "Maternity".into(),
        bed: Some("M-4".into()),
        attending_id: Some(staff.doctor.user_id.clone()),
        reason: Some("Observation".into()),
        daily_rate_cents: 8_000,
    };
    let admission = ledger.admit_patient(&staff.doctor.user_id, request.clone()).unwrap();
    assert!(matches!(
        ledger.admit_patient(&staff.doctor.user_id, request.clone()),
        Err(LedgerError::InvalidState(_))
    ));

    let discharge = ledger
        .discharge_patient(&staff.doctor.user_id, &admission.admission_id)
        .unwrap();
    assert_eq!(discharge.billable_days, 1);
    assert_eq!(discharge.admission.status, AdmissionStatus::Discharged);
    let charge = discharge.charge.unwrap();
    assert_eq!(charge.amount_cents, 8_000);
    assert_eq!(charge.source.kind, ChargeKind::Admission);

    // A cancelled admission posts nothing
    let second = ledger.admit_patient(&staff.doctor.user_id, request).unwrap();
    let cancelled = ledger
        .cancel_admission(&staff.doctor.user_id, &second.admission_id, "Admitted in error")
        .unwrap();
    assert_eq!(cancelled.status, AdmissionStatus::Cancelled);
    assert_eq!(db.list_charges_for_patient(&patient.patient_id).unwrap().len(), 1);
}

#[test]
fn test_pathology_workflow() {
    let db = Database::open_in_memory().unwrap();
    let config = LedgerConfig::default();
    let ledger = ClinicLedger::new(&db, &config);
    let staff = setup(&ledger);
    let patient = register(&ledger, &staff.cashier, "Mercy", "Achieng");

    let order_for = |code: &str| {
        ledger
            .order_pathology_test(
                &staff.doctor.user_id,
                PathologyRequest {
                    patient_id: patient.patient_id.clone(),
                    admission_id: None,
                    test_code: code.into(),
                    test_name: format!("Test {}", code),
                    priority: Priority::Urgent,
                    price_cents: 1_200,
                },
            )
            .unwrap()
    };

    let order = order_for("UEC");
    let order = ledger.advance_pathology_order(&staff.doctor.user_id, &order.order_id, None).unwrap();
    assert_eq!(order.status, PathologyStatus::SampleCollected);
    let order = ledger.advance_pathology_order(&staff.doctor.user_id, &order.order_id, None).unwrap();
    assert_eq!(order.status, PathologyStatus::InProgress);
    assert!(matches!(
        ledger.advance_pathology_order(&staff.doctor.user_id, &order.order_id, None),
        Err(LedgerError::Validation(_))
    ));
    let order = ledger
        .advance_pathology_order(&staff.doctor.user_id, &order.order_id, Some("Normal".into()))
        .unwrap();
    assert_eq!(order.status, PathologyStatus::Completed);
    assert!(order.completed_at.is_some());
    assert!(matches!(
        ledger.cancel_pathology_order(&staff.doctor.user_id, &order.order_id, "late"),
        Err(LedgerError::InvalidState(_))
    ));

    // Cancelling voids the charge, unless money is already on it
    let unpaid = order_for("LFT");
    let cancelled = ledger
        .cancel_pathology_order(&staff.doctor.user_id, &unpaid.order_id, "Duplicate order")
        .unwrap();
    assert_eq!(cancelled.status, PathologyStatus::Cancelled);
    let voided = db.get_charge(unpaid.charge_id.as_deref().unwrap()).unwrap().unwrap();
    assert_eq!(voided.status, ChargeStatus::Voided);

    let paid = order_for("TSH");
    let charge_id = paid.charge_id.clone().unwrap();
    ledger
        .record_payment(
            &staff.cashier.user_id,
            payment(&patient, PaymentMethod::Card, 1_200, vec![charge_id]),
        )
        .unwrap();
    assert!(matches!(
        ledger.cancel_pathology_order(&staff.doctor.user_id, &paid.order_id, "Changed mind"),
        Err(LedgerError::InvalidState(_))
    ));
}

#[test]
fn test_fertility_case_cycles() {
    let db = Database::open_in_memory().unwrap();
    let config = LedgerConfig::default();
    let ledger = ClinicLedger::new(&db, &config);
    let staff = setup(&ledger);
    let patient = register(&ledger, &staff.cashier, "Faith", "Wambui");

    let case = ledger
        .open_fertility_case(
            &staff.doctor.user_id,
            FertilityCaseRequest {
                patient_id: patient.patient_id.clone(),
                treatment: FertilityTreatment::Iui,
                partner_name: Some("Peter Wambui".into()),
                consultant_id: Some(staff.doctor.user_id.clone()),
                notes: None,
            },
        )
        .unwrap();
    assert_eq!(case.cycle_number, 1);

    let charge = ledger
        .record_fertility_procedure(&staff.doctor.user_id, &case.case_id, "IUI procedure", 45_000)
        .unwrap();
    assert_eq!(charge.source.kind, ChargeKind::Fertility);
    assert!(charge.description.starts_with("Cycle 1"));

    let case = ledger
        .start_new_cycle(&staff.doctor.user_id, &case.case_id, Some(FertilityTreatment::Ivf))
        .unwrap();
    assert_eq!(case.cycle_number, 2);
    assert_eq!(case.treatment, FertilityTreatment::Ivf);

    let closed = ledger
        .set_fertility_case_status(&staff.doctor.user_id, &case.case_id, CaseStatus::Closed)
        .unwrap();
    assert_eq!(closed.status, CaseStatus::Closed);

    assert!(matches!(
        ledger.record_fertility_procedure(&staff.doctor.user_id, &case.case_id, "Transfer", 10_000),
        Err(LedgerError::InvalidState(_))
    ));
    assert!(matches!(
        ledger.set_fertility_case_status(&staff.doctor.user_id, &case.case_id, CaseStatus::Active),
        Err(LedgerError::InvalidState(_))
    ));
}

#[test]
fn test_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db");
    let config = LedgerConfig::default();

    let patient_id = {
        let db = Database::open(&path).unwrap();
        let ledger = ClinicLedger::new(&db, &config);
        let staff = setup(&ledger);
        let patient = register(&ledger, &staff.cashier, "Daniel", "Omondi");
        ledger.open_shift(&staff.cashier.user_id, 1_000).unwrap();
        patient.patient_id
    };

    let db = Database::open(&path).unwrap();
    let patient = db.get_patient(&patient_id).unwrap().unwrap();
    assert_eq!(patient.mrn, "MRN-000001");
    assert_eq!(db.list_open_shifts().unwrap().len(), 1);
}

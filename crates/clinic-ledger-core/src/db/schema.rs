//! SQLite schema definition.

/// Complete database schema for the clinic ledger.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Staff
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN (
        'admin', 'manager', 'cashier', 'doctor', 'nurse', 'lab_technician', 'receptionist'
    )),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id TEXT PRIMARY KEY,
    mrn TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    date_of_birth TEXT,
    sex TEXT,
    phone TEXT,
    email TEXT,
    address TEXT,
    notes TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_last_name ON patients(last_name);
CREATE INDEX IF NOT EXISTS idx_patients_phone ON patients(phone);

-- Monotonic counters (MRN sequence)
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

INSERT OR IGNORE INTO sequences (name, value) VALUES ('mrn', 0);

-- ============================================================================
-- Clinical episodes
-- ============================================================================

CREATE TABLE IF NOT EXISTS admissions (
    admission_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    ward TEXT NOT NULL,
    bed TEXT,
    attending_id TEXT REFERENCES users(user_id),
    reason TEXT,
    daily_rate_cents INTEGER NOT NULL CHECK (daily_rate_cents >= 0),
    status TEXT NOT NULL CHECK (status IN ('admitted', 'discharged', 'cancelled')),
    admitted_at TEXT NOT NULL,
    discharged_at TEXT,
    charge_id TEXT REFERENCES service_charges(charge_id)
);

CREATE INDEX IF NOT EXISTS idx_admissions_patient ON admissions(patient_id);
-- At most one active stay per patient
CREATE UNIQUE INDEX IF NOT EXISTS idx_admissions_one_active
    ON admissions(patient_id) WHERE status = 'admitted';

CREATE TABLE IF NOT EXISTS pathology_orders (
    order_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    admission_id TEXT REFERENCES admissions(admission_id),
    test_code TEXT NOT NULL,
    test_name TEXT NOT NULL,
    priority TEXT NOT NULL CHECK (priority IN ('routine', 'urgent', 'stat')),
    status TEXT NOT NULL CHECK (status IN (
        'ordered', 'sample_collected', 'in_progress', 'completed', 'cancelled'
    )),
    price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
    ordered_by TEXT NOT NULL REFERENCES users(user_id),
    result TEXT,
    charge_id TEXT REFERENCES service_charges(charge_id),
    ordered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_pathology_patient ON pathology_orders(patient_id);
CREATE INDEX IF NOT EXISTS idx_pathology_status ON pathology_orders(status);

CREATE TABLE IF NOT EXISTS fertility_cases (
    case_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    partner_name TEXT,
    treatment TEXT NOT NULL CHECK (treatment IN ('consultation', 'iui', 'ivf', 'icsi', 'fet')),
    cycle_number INTEGER NOT NULL DEFAULT 1 CHECK (cycle_number >= 1),
    status TEXT NOT NULL CHECK (status IN ('active', 'on_hold', 'completed', 'closed')),
    consultant_id TEXT REFERENCES users(user_id),
    notes TEXT,
    opened_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fertility_patient ON fertility_cases(patient_id);

-- ============================================================================
-- Charges, payments, allocations
-- ============================================================================

CREATE TABLE IF NOT EXISTS service_charges (
    charge_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    source_kind TEXT NOT NULL CHECK (source_kind IN (
        'admission', 'pathology', 'fertility', 'consultation', 'pharmacy', 'other'
    )),
    source_reference TEXT,
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    allocated_cents INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL CHECK (status IN ('open', 'partially_paid', 'paid', 'voided')),
    posted_by TEXT NOT NULL REFERENCES users(user_id),
    charged_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (allocated_cents >= 0 AND allocated_cents <= amount_cents)
);

CREATE INDEX IF NOT EXISTS idx_charges_patient ON service_charges(patient_id, status);

CREATE TABLE IF NOT EXISTS shifts (
    shift_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(user_id),
    status TEXT NOT NULL CHECK (status IN ('open', 'closed')),
    opening_balance_cents INTEGER NOT NULL CHECK (opening_balance_cents >= 0),
    cash_collected_cents INTEGER NOT NULL DEFAULT 0,
    non_cash_collected_cents INTEGER NOT NULL DEFAULT 0,
    cash_refunded_cents INTEGER NOT NULL DEFAULT 0,
    non_cash_refunded_cents INTEGER NOT NULL DEFAULT 0,
    paid_in_cents INTEGER NOT NULL DEFAULT 0,
    paid_out_cents INTEGER NOT NULL DEFAULT 0,
    dropped_cents INTEGER NOT NULL DEFAULT 0,
    closing_balance_cents INTEGER,
    expected_cash_cents INTEGER,
    variance_cents INTEGER,
    variance_status TEXT CHECK (variance_status IN ('balanced', 'over', 'short')),
    closed_by TEXT REFERENCES users(user_id),
    notes TEXT,
    opened_at TEXT NOT NULL,
    closed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_shifts_user ON shifts(user_id, opened_at);
-- One open shift per user
CREATE UNIQUE INDEX IF NOT EXISTS idx_shifts_one_open
    ON shifts(user_id) WHERE status = 'open';

CREATE TABLE IF NOT EXISTS payments (
    payment_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    shift_id TEXT REFERENCES shifts(shift_id),
    received_by TEXT NOT NULL REFERENCES users(user_id),
    method TEXT NOT NULL CHECK (method IN (
        'cash', 'card', 'mobile_money', 'bank_transfer', 'insurance'
    )),
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    allocated_cents INTEGER NOT NULL DEFAULT 0,
    refunded_cents INTEGER NOT NULL DEFAULT 0,
    reference TEXT,
    received_at TEXT NOT NULL,
    CHECK (allocated_cents >= 0 AND refunded_cents >= 0),
    CHECK (allocated_cents + refunded_cents <= amount_cents)
);

CREATE INDEX IF NOT EXISTS idx_payments_patient ON payments(patient_id);
CREATE INDEX IF NOT EXISTS idx_payments_shift ON payments(shift_id);

CREATE TABLE IF NOT EXISTS payment_allocations (
    allocation_id TEXT PRIMARY KEY,
    payment_id TEXT NOT NULL REFERENCES payments(payment_id),
    charge_id TEXT NOT NULL REFERENCES service_charges(charge_id),
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    allocated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_allocations_payment ON payment_allocations(payment_id);
CREATE INDEX IF NOT EXISTS idx_allocations_charge ON payment_allocations(charge_id);

CREATE TABLE IF NOT EXISTS refunds (
    refund_id TEXT PRIMARY KEY,
    payment_id TEXT NOT NULL REFERENCES payments(payment_id),
    shift_id TEXT REFERENCES shifts(shift_id),
    method TEXT NOT NULL,
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    reason TEXT NOT NULL,
    refunded_by TEXT NOT NULL REFERENCES users(user_id),
    refunded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_refunds_payment ON refunds(payment_id);
CREATE INDEX IF NOT EXISTS idx_refunds_shift ON refunds(shift_id);

CREATE TABLE IF NOT EXISTS cash_movements (
    movement_id TEXT PRIMARY KEY,
    shift_id TEXT NOT NULL REFERENCES shifts(shift_id),
    kind TEXT NOT NULL CHECK (kind IN ('pay_in', 'pay_out', 'drop')),
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    reason TEXT NOT NULL,
    recorded_by TEXT NOT NULL REFERENCES users(user_id),
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_movements_shift ON cash_movements(shift_id);

-- ============================================================================
-- Audit trail (Append-Only - Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS audit_nodes (
    hash TEXT PRIMARY KEY,                       -- SHA-256 of content or children
    node_type TEXT NOT NULL CHECK (node_type IN ('leaf', 'internal')),
    left_child TEXT REFERENCES audit_nodes(hash),
    right_child TEXT REFERENCES audit_nodes(hash),
    payload TEXT,                                -- canonical JSON (leaf only)
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TRIGGER IF NOT EXISTS audit_nodes_check_leaf BEFORE INSERT ON audit_nodes
WHEN new.node_type = 'leaf'
BEGIN
    SELECT CASE
        WHEN new.payload IS NULL THEN
            RAISE(ABORT, 'Leaf nodes must have payload')
        WHEN new.left_child IS NOT NULL OR new.right_child IS NOT NULL THEN
            RAISE(ABORT, 'Leaf nodes cannot have children')
    END;
END;

CREATE TRIGGER IF NOT EXISTS audit_nodes_check_internal BEFORE INSERT ON audit_nodes
WHEN new.node_type = 'internal'
BEGIN
    SELECT CASE
        WHEN new.left_child IS NULL THEN
            RAISE(ABORT, 'Internal nodes must have left child')
        WHEN new.payload IS NOT NULL THEN
            RAISE(ABORT, 'Internal nodes cannot have payload')
    END;
END;

CREATE TRIGGER IF NOT EXISTS audit_nodes_no_update BEFORE UPDATE ON audit_nodes
BEGIN
    SELECT RAISE(ABORT, 'Audit nodes are immutable');
END;

CREATE INDEX IF NOT EXISTS idx_audit_type ON audit_nodes(node_type);

-- Current root (single row, updated atomically)
CREATE TABLE IF NOT EXISTS audit_root (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    root_hash TEXT REFERENCES audit_nodes(hash),
    tree_height INTEGER NOT NULL DEFAULT 0,
    leaf_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

INSERT OR IGNORE INTO audit_root (id, root_hash, tree_height, leaf_count)
VALUES (1, NULL, 0, 0);

-- Right-edge frontier: the completed subtree waiting for a right sibling at
-- each level. Level k is present iff bit k of audit_root.leaf_count is set.
CREATE TABLE IF NOT EXISTS audit_frontier (
    level INTEGER PRIMARY KEY CHECK (level >= 0),
    hash TEXT NOT NULL REFERENCES audit_nodes(hash)
);

-- ============================================================================
-- Activity log
-- ============================================================================

CREATE TABLE IF NOT EXISTS activity_log (
    entry_id TEXT PRIMARY KEY,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',          -- JSON object
    recorded_at TEXT NOT NULL,
    leaf_hash TEXT NOT NULL REFERENCES audit_nodes(hash)
);

CREATE INDEX IF NOT EXISTS idx_activity_entity ON activity_log(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_activity_actor ON activity_log(actor_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_activity_time ON activity_log(recorded_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_reapplies_cleanly() {
        let conn = conn();
        assert!(conn.execute_batch(SCHEMA).is_ok());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_root", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_one_open_shift_per_user() {
        let conn = conn();
        conn.execute(
            "INSERT INTO users (user_id, username, display_name, role, created_at, updated_at)
             VALUES ('u1', 'cash1', 'Cashier', 'cashier', 'now', 'now')",
            [],
        )
        .unwrap();

        let open = "INSERT INTO shifts (shift_id, user_id, status, opening_balance_cents, opened_at)
                    VALUES (?, 'u1', ?, 0, 'now')";
        conn.execute(open, ["s1", "open"]).unwrap();
        assert!(conn.execute(open, ["s2", "open"]).is_err());
        // Closed shifts do not count
        conn.execute(open, ["s3", "closed"]).unwrap();
    }

    #[test]
    fn test_audit_leaf_constraint() {
        let conn = conn();

        let result = conn.execute(
            "INSERT INTO audit_nodes (hash, node_type) VALUES ('abc', 'leaf')",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO audit_nodes (hash, node_type, payload) VALUES ('abc', 'leaf', 'entry')",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_audit_nodes_immutable() {
        let conn = conn();
        conn.execute(
            "INSERT INTO audit_nodes (hash, node_type, payload) VALUES ('abc', 'leaf', 'entry')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "UPDATE audit_nodes SET payload = 'forged' WHERE hash = 'abc'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_allocation_cannot_exceed_charge() {
        let conn = conn();
        conn.execute_batch(
            r#"
            INSERT INTO users (user_id, username, display_name, role, created_at, updated_at)
            VALUES ('u1', 'doc', 'Doctor', 'doctor', 'now', 'now');
            INSERT INTO patients (patient_id, mrn, first_name, last_name, created_at, updated_at)
            VALUES ('p1', 'MRN-1', 'A', 'B', 'now', 'now');
            "#,
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO service_charges (charge_id, patient_id, source_kind, description,
                amount_cents, allocated_cents, status, posted_by, charged_at, updated_at)
             VALUES ('c1', 'p1', 'other', 'x', 100, 150, 'paid', 'u1', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}

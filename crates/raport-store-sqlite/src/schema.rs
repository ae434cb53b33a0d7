//! SQL schema for the raport SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS academic_years (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    label       TEXT NOT NULL UNIQUE,   -- e.g. '2024/2025'
    status      TEXT NOT NULL DEFAULT 'inactive',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS periods (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    academic_year_id  INTEGER NOT NULL REFERENCES academic_years(id),
    semester          INTEGER NOT NULL CHECK (semester IN (1, 2)),
    label             TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'inactive',
    created_at        TEXT NOT NULL,
    UNIQUE (academic_year_id, semester)
);

-- At most one active period system-wide.
CREATE UNIQUE INDEX IF NOT EXISTS periods_single_active_idx
    ON periods(status) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS classes (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    name                 TEXT NOT NULL,
    capacity             INTEGER,
    homeroom_teacher_id  INTEGER,
    next_class_id        INTEGER REFERENCES classes(id),
    created_at           TEXT NOT NULL,
    CHECK (next_class_id IS NULL OR next_class_id != id)
);

CREATE TABLE IF NOT EXISTS students (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    enrollment_number   TEXT NOT NULL UNIQUE,
    name                TEXT NOT NULL,
    gender              TEXT,
    birth_date          TEXT,            -- ISO 8601 date
    current_class_id    INTEGER REFERENCES classes(id),
    current_room_id     INTEGER,
    enrollment_year_id  INTEGER REFERENCES academic_years(id),
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS promotion_logs (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    from_period_id    INTEGER NOT NULL REFERENCES periods(id),
    to_period_id      INTEGER NOT NULL REFERENCES periods(id),
    source_class_id   INTEGER NOT NULL REFERENCES classes(id),
    target_class_id   INTEGER REFERENCES classes(id),
    mode              TEXT NOT NULL,     -- 'auto' | 'manual' | 'explicit'
    executed_by       INTEGER,
    note              TEXT,
    promoted_count    INTEGER NOT NULL DEFAULT 0,
    held_back_count   INTEGER NOT NULL DEFAULT 0,
    idempotency_key   TEXT UNIQUE,
    created_at        TEXT NOT NULL
);

-- The ledger is append-only: rows are never deleted and their
-- student/period/class columns are never updated. Only the two
-- teacher notes may change.
CREATE TABLE IF NOT EXISTS student_class_history (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id        INTEGER NOT NULL REFERENCES students(id),
    period_id         INTEGER NOT NULL REFERENCES periods(id),
    class_id          INTEGER NOT NULL REFERENCES classes(id),
    kind              TEXT NOT NULL,     -- 'enrolled' | 'promoted' | 'held_back' | 'repair' | 'manual'
    note              TEXT,
    academic_note     TEXT,
    behavioral_note   TEXT,
    promotion_log_id  INTEGER REFERENCES promotion_logs(id),
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS promotion_outcomes (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    promotion_log_id  INTEGER NOT NULL REFERENCES promotion_logs(id),
    student_id        INTEGER NOT NULL REFERENCES students(id),
    status            TEXT NOT NULL CHECK (status IN ('naik', 'tinggal')),
    from_class_id     INTEGER NOT NULL REFERENCES classes(id),
    to_class_id       INTEGER NOT NULL REFERENCES classes(id),
    history_id        INTEGER NOT NULL REFERENCES student_class_history(id),
    created_at        TEXT NOT NULL,
    UNIQUE (promotion_log_id, student_id)
);

CREATE INDEX IF NOT EXISTS history_student_period_idx
    ON student_class_history(student_id, period_id);
CREATE INDEX IF NOT EXISTS history_period_idx ON student_class_history(period_id);
CREATE INDEX IF NOT EXISTS students_class_idx ON students(current_class_id);
CREATE INDEX IF NOT EXISTS promotion_logs_triple_idx
    ON promotion_logs(from_period_id, source_class_id, to_period_id);
CREATE INDEX IF NOT EXISTS outcomes_log_idx ON promotion_outcomes(promotion_log_id);

PRAGMA user_version = 1;
";

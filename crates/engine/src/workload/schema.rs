//! AS3AP relation names and DDL
//!
//! Identifiers are quoted because several AS3AP column names (`key`, `int`,
//! `date`, ...) are reserved words. The statements are plain SQL-92 text that
//! the engine hands to the driver unchanged.

/// Relation mutated by the OLTP workload and the cross-section
pub const UPDATES: &str = "\"updates\"";
/// Copy of `updates` scanned by the 100k-row select and joined by the report
pub const HUNDRED: &str = "\"hundred\"";
/// One-row relation scanned by `o_mode_tiny`
pub const TINY: &str = "\"tiny\"";
/// Backup of `updates` used to restore it after the cross-section
pub const SAVE_UPDATES: &str = "\"saveupdates\"";
/// Staging copy of the sequential 100-row selection
pub const SEL_100_SEQ: &str = "\"sel100seq\"";
/// Staging copy of the random 100-row selection
pub const SEL_100_RND: &str = "\"sel100rnd\"";

/// Column list of the ten-column AS3AP relations, in storage order
pub const COLUMNS: [&str; 10] = [
    "\"key\"",
    "\"int\"",
    "\"signed\"",
    "\"float\"",
    "\"double\"",
    "\"decim\"",
    "\"date\"",
    "\"code\"",
    "\"name\"",
    "\"address\"",
];

/// `updates` relation
pub const CREATE_UPDATES: &str =
    r#"CREATE TABLE "updates" ("key" INTEGER NOT NULL, "int" INTEGER NOT NULL, "signed" INTEGER, "float" FLOAT NOT NULL, "double" DOUBLE PRECISION NOT NULL, "decim" NUMERIC(18,2) NOT NULL, "date" TIMESTAMP NOT NULL, "code" CHAR(10) NOT NULL, "name" CHAR(20) NOT NULL, "address" VARCHAR(80) NOT NULL, PRIMARY KEY ("key"))"#;

/// `hundred` relation
pub const CREATE_HUNDRED: &str =
    r#"CREATE TABLE "hundred" ("key" INTEGER NOT NULL, "int" INTEGER NOT NULL, "signed" INTEGER, "float" FLOAT NOT NULL, "double" DOUBLE PRECISION NOT NULL, "decim" NUMERIC(18,2) NOT NULL, "date" TIMESTAMP NOT NULL, "code" CHAR(10) NOT NULL, "name" CHAR(20) NOT NULL, "address" VARCHAR(80) NOT NULL, PRIMARY KEY ("key"))"#;

/// `tiny` relation
pub const CREATE_TINY: &str =
    r#"CREATE TABLE "tiny" ("key" INTEGER NOT NULL, PRIMARY KEY ("key"))"#;

/// `saveupdates` relation (no primary key)
pub const CREATE_SAVE_UPDATES: &str =
    r#"CREATE TABLE "saveupdates" ("key" INTEGER NOT NULL, "int" INTEGER NOT NULL, "signed" INTEGER, "float" FLOAT NOT NULL, "double" DOUBLE PRECISION NOT NULL, "decim" NUMERIC(18,2) NOT NULL, "date" TIMESTAMP NOT NULL, "code" CHAR(10) NOT NULL, "name" CHAR(20) NOT NULL, "address" VARCHAR(80) NOT NULL)"#;

/// `sel100seq` staging relation
pub const CREATE_SEL_100_SEQ: &str =
    r#"CREATE TABLE "sel100seq" ("key" INTEGER NOT NULL, "int" INTEGER NOT NULL, "signed" INTEGER, "float" FLOAT NOT NULL, "double" DOUBLE PRECISION NOT NULL, "decim" NUMERIC(18,2) NOT NULL, "date" TIMESTAMP NOT NULL, "code" CHAR(10) NOT NULL, "name" CHAR(20) NOT NULL, "address" VARCHAR(80) NOT NULL, PRIMARY KEY ("key"))"#;

/// `sel100rnd` staging relation
pub const CREATE_SEL_100_RND: &str =
    r#"CREATE TABLE "sel100rnd" ("key" INTEGER NOT NULL, "int" INTEGER NOT NULL, "signed" INTEGER, "float" FLOAT NOT NULL, "double" DOUBLE PRECISION NOT NULL, "decim" NUMERIC(18,2) NOT NULL, "date" TIMESTAMP NOT NULL, "code" CHAR(10) NOT NULL, "name" CHAR(20) NOT NULL, "address" VARCHAR(80) NOT NULL, PRIMARY KEY ("key"))"#;

/// Drop `updates`
pub const DROP_UPDATES: &str = r#"DROP TABLE "updates""#;

/// Every CREATE statement, in creation order
pub const CREATE_ALL: [&str; 6] = [
    CREATE_UPDATES,
    CREATE_HUNDRED,
    CREATE_TINY,
    CREATE_SAVE_UPDATES,
    CREATE_SEL_100_SEQ,
    CREATE_SEL_100_RND,
];

/// Parameterized single-row insert into `updates`
pub const INSERT_UPDATES: &str =
    r#"INSERT INTO "updates" ("key", "int", "signed", "float", "double", "decim", "date", "code", "name", "address") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

/// Populate `hundred` from `updates`
pub const FILL_HUNDRED: &str = r#"INSERT INTO "hundred" SELECT * FROM "updates""#;

/// The single `tiny` row
pub const FILL_TINY: &str = r#"INSERT INTO "tiny" ("key") VALUES (1)"#;

/// Back up `updates` into `saveupdates`
pub const BACKUP_UPDATES: &str = r#"INSERT INTO "saveupdates" SELECT * FROM "updates""#;

//! Admin commands understood by the engine.

use crate::bson::Document;

/// Database every admin command is addressed to.
pub const ADMIN_DB: &str = "admin";

/// `{ shutdown: 1, $db: "admin" }`, optionally with `force: true`.
#[must_use]
pub fn shutdown(force: bool) -> Document {
    let mut command = Document::new().with("shutdown", 1);
    if force {
        command.insert("force", true);
    }
    command.with("$db", ADMIN_DB)
}

/// `{ hello: 1, $db: "admin" }`.
#[must_use]
pub fn hello() -> Document {
    Document::new().with("hello", 1).with("$db", ADMIN_DB)
}

/// `{ ping: 1, $db: "admin" }`.
#[must_use]
pub fn ping() -> Document {
    Document::new().with("ping", 1).with("$db", ADMIN_DB)
}

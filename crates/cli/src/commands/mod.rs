mod discover;
mod run;
mod status;

pub use discover::discover;
pub use run::run;
pub use status::status;

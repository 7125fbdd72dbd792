mod processes;

pub use processes::*;

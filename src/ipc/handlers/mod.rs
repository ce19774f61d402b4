pub mod analytics;
pub mod core;
pub mod marks;
pub mod staff;
pub mod students;
pub mod subjects;

pub mod artifact;
pub mod job_record;
pub mod stage;

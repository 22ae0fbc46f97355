pub mod alert;
pub mod dose;
pub mod intake;
pub mod reading;
pub mod rendered_file;

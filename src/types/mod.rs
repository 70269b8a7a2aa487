pub mod activity;
pub mod catalog;
pub mod equipment;
pub mod tour;

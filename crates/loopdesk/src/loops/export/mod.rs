//! Loop exports: CSV listings and single-loop PDF reports.

pub mod csv;
pub mod pdf;

pub use pdf::ReportImage;

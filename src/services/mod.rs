pub mod reports;

pub use reports::ReportService;

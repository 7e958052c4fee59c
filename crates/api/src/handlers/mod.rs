pub mod drafts;
pub mod images;

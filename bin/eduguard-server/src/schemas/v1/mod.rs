pub mod edu;

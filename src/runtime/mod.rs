pub mod negotiations;

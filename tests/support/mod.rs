pub mod watchface;

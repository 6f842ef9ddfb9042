pub mod drp;

pub mod dhcpd;
pub mod sheet_read;
pub mod sheet_write;

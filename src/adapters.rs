pub mod crm_client;
pub mod psp;

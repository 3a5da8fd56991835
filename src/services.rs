pub mod crm_payloads;
pub mod crm_sender;
pub mod psp_poller;

pub mod command_list;
pub mod command_processor;
pub mod deferred_release;

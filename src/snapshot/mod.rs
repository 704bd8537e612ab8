pub mod actions;
pub mod ago;
pub mod backend;
pub mod cascade;
pub mod interval;
pub mod planner;
pub mod record;
pub mod result_error;
pub mod snapshot_config;
pub mod transfer;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;

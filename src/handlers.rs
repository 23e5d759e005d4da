use crate::config::Config;
use crate::oidmap::OidMap;

pub mod notify_filter_profile;

pub fn load_handlers(oid_map: &mut OidMap, config: &Config) {
    notify_filter_profile::load_handler(oid_map, config);
}

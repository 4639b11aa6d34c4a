pub mod ctrv;
pub mod measurement;
pub mod ukf_ctrv;
pub mod unscented;

pub mod serve;
pub mod stripe_setup;

pub mod channel;
pub mod guest_orders;
pub mod merge;
pub mod normalize;
pub mod pms;
pub mod room_types;
pub mod scheduler;
pub mod status;
pub mod walk_in;

// External sharing implementations.

pub mod linkedin_publisher;

pub use linkedin_publisher::LinkedInPublisher;

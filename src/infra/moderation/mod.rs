// Moderation provider implementations and the factory that selects them.

pub mod openai_client;
pub mod perspective_client;
pub mod provider_factory;
pub mod self_hosted;

pub use openai_client::OpenAiModerationClient;
pub use perspective_client::PerspectiveClient;
pub use provider_factory::{mask_key, ProviderFactory, ProviderSettings};
pub use self_hosted::SelfHostedModel;

pub mod context;
pub mod models;
pub mod provider;
pub mod registry;
pub mod session;
pub mod transport;

pub use models::{ChatRequest, ClientCommand, Exchange, GenerationRequest, ServerEvent};
pub use provider::{
    BoxedCompletionProvider, CompletionProvider, EchoProvider, FragmentStream, OpenAiProvider,
    provider_from_config,
};
pub use registry::SessionRegistry;
pub use session::{ChatSession, GENERIC_ERROR_MESSAGE, Outcome, SessionSettings, Submission};
pub use transport::{ChannelTransport, ClientTransport};

pub mod dummy;
pub mod gemini;
pub mod local;
pub mod openai;

pub use dummy::DummyProvider;
pub use gemini::GeminiProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;

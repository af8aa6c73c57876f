pub mod human;
pub mod openai;

pub use human::HumanDecisionService;
pub use openai::{OpenAiDecisionService, OpenAiServiceConfig, OpenAiVisionDescriber};

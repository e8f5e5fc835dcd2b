pub mod command;
pub mod echo;
pub mod unavailable;

pub use command::CommandClient;
pub use echo::EchoClient;
pub use unavailable::UnavailableClient;

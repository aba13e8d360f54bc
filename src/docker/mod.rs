pub mod backend;
pub mod context;
pub mod template;

pub use backend::{BuildBackend, BuildRequest, DockerCli};
pub use template::{MustacheRenderer, TemplateError, TemplateRenderer};

// Centralized constants for chainbuild to avoid magic numbers and strings

/// Docker Hub API root used to list published tags
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";

/// Number of tags requested per page from the registry
pub const DEFAULT_TAG_PAGE_SIZE: u32 = 100;

/// Build-instruction template every image directory must contain
pub const TEMPLATE_FILE: &str = "Dockerfile.template";

/// Optional per-image metadata next to the template
pub const MANIFEST_FILE: &str = "container.yml";

/// Directory under an image's source whose contents become the build context
pub const CONTEXT_DIR: &str = "context";

/// Name of the rendered build-instruction file inside a staged context
pub const RENDERED_FILE: &str = "Dockerfile";

/// Default staging directory for build contexts
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Default version prefix, as in `v007`
pub const DEFAULT_VERSION_PREFIX: &str = "v";

/// Default zero-padded width of the version number
pub const DEFAULT_VERSION_WIDTH: usize = 3;

/// Default container CLI used by the build backend
pub const DEFAULT_DOCKER_PROGRAM: &str = "docker";

/// Error classification and reporting
#[cfg(test)]
mod tests {
    use chainbuild::config::parse_pin;
    use chainbuild::docker::template::render_str;
    use chainbuild::docker::TemplateError;
    use chainbuild::error::{BuildStage, ChainBuildError, ConfigError};
    use chainbuild::version::VersionFormat;
    use std::collections::BTreeMap;

    #[test]
    fn test_config_errors_share_an_exit_code() {
        let errors: Vec<ChainBuildError> = vec![
            ConfigError::DuplicateRepo("base".to_string()).into(),
            ConfigError::SelfDependency("base".to_string()).into(),
            ConfigError::InvalidPin("base".to_string()).into(),
            ConfigError::MissingPublishedVersion("base".to_string()).into(),
        ];
        for err in &errors {
            assert_eq!(err.exit_code(), 2, "{err}");
            assert_eq!(err.repos(), vec!["base"]);
        }
    }

    #[test]
    fn test_missing_published_version_suggests_pin() {
        let err: ChainBuildError = ConfigError::MissingPublishedVersion("base".to_string()).into();
        assert!(err.to_string().contains("--pin base=<version>"));
    }

    #[test]
    fn test_plumbing_errors_exit_with_one() {
        let io: ChainBuildError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io.exit_code(), 1);
        assert!(io.repos().is_empty());

        let other: ChainBuildError = anyhow::anyhow!("unexpected").into();
        assert_eq!(other.exit_code(), 1);
        assert_eq!(other.to_string(), "unexpected");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(BuildStage::Render.to_string(), "render");
        assert_eq!(BuildStage::Build.to_string(), "build");
        assert_eq!(BuildStage::Publish.to_string(), "publish");
    }

    #[test]
    fn test_unresolved_placeholders_are_all_reported() {
        let err = render_str("FROM {{a}}:{{b}}\nCOPY {{a}} .\n", &BTreeMap::new()).unwrap_err();
        match err {
            TemplateError::Unresolved(names) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_pin_message() {
        let err = parse_pin("base:v1", &VersionFormat::default()).unwrap_err();
        assert_eq!(err.to_string(), "invalid pin 'base:v1': expected <repo>=<version>");
    }
}

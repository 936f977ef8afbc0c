//! Tests for per-package resolution against a profile and user configuration

use assert_matches::assert_matches;
use buckos_profile::{
    Domain, Error, HiddenReason, LicenseGroups, Package, ProfileOptions, ProfileStack,
    ResolverConfig, UserConfig, Visibility,
};
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A two-level profile plus an /etc/buckos style directory
fn create_test_tree() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let root = dir.path();

    write(root, "profiles/base/eapi", "5\n");
    write(
        root,
        "profiles/base/make.defaults",
        "ARCH=\"amd64\"\n\
         ACCEPT_KEYWORDS=\"amd64\"\n\
         USE=\"ipv6 X\"\n\
         ACCEPT_LICENSE=\"-* @FREE\"\n\
         IUSE_IMPLICIT=\"prefix\"\n",
    );
    write(root, "profiles/base/use.mask", "selinux\n");
    write(root, "profiles/base/use.stable.mask", "jit\n");
    write(root, "profiles/base/package.use.force", "dev-lang/python ssl\n");
    write(root, "profiles/base/package.use", "app-editors/vim -X python\n");
    write(root, "profiles/base/package.mask", "=dev-util/broken-1\n>=app-misc/new-2\n");
    write(root, "profiles/base/package.keywords", "dev-util/kw amd64\n");
    write(root, "profiles/base/packages", ">=sys-libs/glibc-2.30\n");

    write(root, "profiles/leaf/eapi", "5\n");
    write(root, "profiles/leaf/parent", "../base\n");

    write(root, "etc/make.conf", "USE=\"-ipv6 doc\"\nACCEPT_LICENSE=\"NVIDIA\"\n");
    write(root, "etc/package.use/editors", "app-editors/vim X\n");
    write(root, "etc/package.mask", "dev-games/*\n");
    write(root, "etc/package.unmask", ">=app-misc/new-2\n");
    write(
        root,
        "etc/package.accept_keywords",
        "dev-util/edge\ndev-util/any **\ndev-util/star *\ndev-util/tilde ~*\n",
    );
    write(root, "etc/package.license", "app-misc/proprietary Proprietary-EULA\n");
    write(root, "license_groups", "FREE @FREE-SOFTWARE\nFREE-SOFTWARE GPL-2 MIT\n");

    dir
}

fn create_domain(dir: &TempDir) -> Domain {
    let stack = ProfileStack::load(&dir.path().join("profiles/leaf"), ProfileOptions::default())
        .expect("Failed to load profile");
    let user = UserConfig::load(&dir.path().join("etc")).expect("Failed to load user config");
    let groups = LicenseGroups::load(&dir.path().join("license_groups")).unwrap();
    Domain::new(stack, user, groups).expect("Failed to build domain")
}

fn pkg(cpv: &str) -> Package {
    Package::parse_cpv(cpv).unwrap()
}

fn set(s: &[&str]) -> BTreeSet<String> {
    s.iter().map(|x| x.to_string()).collect()
}

mod masking {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_mask() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        assert!(domain.is_masked(&pkg("dev-util/broken-1")));
        assert!(!domain.is_masked(&pkg("dev-util/broken-2")));
    }

    #[test]
    fn test_user_unmask_wins() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        assert!(!domain.is_masked(&pkg("app-misc/new-2")));
    }

    #[test]
    fn test_user_wildcard_mask() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        assert!(domain.is_masked(&pkg("dev-games/tetris-1")));
        assert!(!domain.is_masked(&pkg("dev-util/tetris-1")));
    }

    #[test]
    fn test_profile_visibility_atoms() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let old = pkg("sys-libs/glibc-2.29").with_keywords("amd64").with_licenses("GPL-2");
        assert!(domain.is_masked(&old));
        assert_eq!(
            domain.visibility(&old),
            Visibility::Hidden(vec![HiddenReason::NotInProfile(">=sys-libs/glibc-2.30".to_string())])
        );
        let new = pkg("sys-libs/glibc-2.38").with_keywords("amd64").with_licenses("GPL-2");
        assert!(domain.visibility(&new).is_visible());
    }
}

mod keywords {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stable_keyword_accepted() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        assert!(domain.keywords_accepted(&pkg("dev-util/foo-1").with_keywords("amd64 ~arm64")));
        assert!(!domain.keywords_accepted(&pkg("dev-util/foo-1").with_keywords("~amd64")));
    }

    #[test]
    fn test_empty_line_means_testing_arch() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        assert!(domain.keywords_accepted(&pkg("dev-util/edge-1").with_keywords("~amd64")));
        assert!(!domain.keywords_accepted(&pkg("dev-util/edge-1").with_keywords("~arm64")));
    }

    #[test]
    fn test_wildcard_keywords() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        assert!(domain.keywords_accepted(&pkg("dev-util/any-1")));
        assert!(domain.keywords_accepted(&pkg("dev-util/star-1").with_keywords("arm64")));
        assert!(!domain.keywords_accepted(&pkg("dev-util/star-1").with_keywords("~arm64")));
        assert!(domain.keywords_accepted(&pkg("dev-util/tilde-1").with_keywords("~arm64")));
    }

    #[test]
    fn test_profile_package_keywords() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let kw = pkg("dev-util/kw-1").with_keywords("~amd64");
        assert_eq!(domain.effective_keywords(&kw), set(&["amd64", "~amd64"]));
        assert!(domain.keywords_accepted(&kw));
        assert!(domain.is_stable(&kw));
    }

    #[test]
    fn test_testing_defaults_use_union() {
        let dir = create_test_tree();
        write(dir.path(), "etc/make.conf", "ACCEPT_KEYWORDS=\"~amd64\"\n");
        let domain = create_domain(&dir);
        assert_eq!(
            domain.accepted_keywords(&pkg("dev-util/any-1")),
            set(&["**", "amd64", "~amd64"])
        );
        assert!(domain.keywords_accepted(&pkg("dev-util/foo-1").with_keywords("~amd64")));
    }
}

mod licenses {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_groups_and_make_conf() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        assert!(domain.license_accepted(&pkg("dev-util/foo-1").with_licenses("GPL-2 MIT")));
        assert!(domain.license_accepted(&pkg("x11-drivers/nvidia-1").with_licenses("NVIDIA")));
        assert_eq!(
            domain.missing_licenses(&pkg("dev-util/foo-1").with_licenses("MIT BSD")),
            vec!["BSD".to_string()]
        );
    }

    #[test]
    fn test_package_license() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let eula = "Proprietary-EULA";
        assert!(domain.license_accepted(&pkg("app-misc/proprietary-1").with_licenses(eula)));
        assert!(!domain.license_accepted(&pkg("app-misc/other-1").with_licenses(eula)));
    }

    #[test]
    fn test_wildcard_with_exclusion() {
        let dir = create_test_tree();
        write(dir.path(), "etc/make.conf", "ACCEPT_LICENSE=\"* -BSL-1.1\"\n");
        let domain = create_domain(&dir);
        assert!(domain.license_accepted(&pkg("dev-util/foo-1").with_licenses("Artistic")));
        assert!(!domain.license_accepted(&pkg("dev-util/foo-1").with_licenses("BSL-1.1")));
    }

    #[test]
    fn test_package_license_group_cycle_fails_domain() {
        let dir = create_test_tree();
        write(dir.path(), "license_groups", "FREE MIT\nA GPL-2 @B\nB @A\n");
        write(dir.path(), "etc/package.license", "dev-util/foo @A\n");
        let stack =
            ProfileStack::load(&dir.path().join("profiles/leaf"), ProfileOptions::default()).unwrap();
        let user = UserConfig::load(&dir.path().join("etc")).unwrap();
        let groups = LicenseGroups::load(&dir.path().join("license_groups")).unwrap();
        let err = Domain::new(stack, user, groups).unwrap_err();
        assert_matches!(err, Error::Invalid(_));
    }

    #[test]
    fn test_package_license_groups_expand() {
        let dir = create_test_tree();
        write(dir.path(), "license_groups", "FREE MIT\nVENDOR EULA-A EULA-B\n");
        write(dir.path(), "etc/package.license", "dev-util/foo @VENDOR -EULA-B\n");
        let domain = create_domain(&dir);
        let foo = pkg("dev-util/foo-1");
        assert_eq!(
            domain.accepted_licenses(&foo),
            set(&["-EULA-B", "EULA-A", "MIT", "NVIDIA"])
        );
        assert!(domain.license_accepted(&foo.clone().with_licenses("EULA-A MIT")));
        assert!(!domain.license_accepted(&foo.with_licenses("EULA-B")));
    }

    #[test]
    fn test_hidden_reasons_accumulate() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let broken = pkg("dev-util/broken-1").with_keywords("~amd64").with_licenses("BSD");
        assert_eq!(
            domain.visibility(&broken),
            Visibility::Hidden(vec![
                HiddenReason::Masked,
                HiddenReason::MissingKeyword(vec!["~amd64".to_string()]),
                HiddenReason::License(vec!["BSD".to_string()]),
            ])
        );
    }
}

mod use_flags {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layer_order() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let vim = pkg("app-editors/vim-9.0")
            .with_keywords("amd64")
            .with_iuse("+acl X python ipv6 doc selinux");

        let state = domain.use_state(&vim);
        assert_eq!(state.enabled, set(&["X", "acl", "doc", "python"]));
        assert_eq!(state.masked, set(&["jit", "selinux"]));
        assert!(state.forced.is_empty());
    }

    #[test]
    fn test_forced_and_iuse_filter() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let python = pkg("dev-lang/python-3.11").with_keywords("~amd64").with_iuse("ssl tk");

        let state = domain.use_state(&python);
        assert_eq!(state.forced, set(&["ssl"]));
        // testing keyword, so the stable mask does not apply
        assert_eq!(state.masked, set(&["selinux"]));
        assert_eq!(state.enabled, set(&["ssl"]));
    }

    #[test]
    fn test_mask_beats_iuse_default() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let pkg = pkg("sys-apps/coreutils-9").with_iuse("+selinux +nls");
        assert_eq!(domain.use_state(&pkg).enabled, set(&["nls"]));
    }

    #[test]
    fn test_mask_beats_force() {
        let dir = create_test_tree();
        write(dir.path(), "profiles/base/use.force", "selinux\n");
        let domain = create_domain(&dir);
        let state = domain.use_state(&pkg("sys-apps/coreutils-9").with_iuse("selinux nls"));
        assert_eq!(state.forced, set(&["selinux"]));
        assert_eq!(state.masked, set(&["selinux"]));
        assert!(state.enabled.is_empty());
    }

    #[test]
    fn test_stable_masks_skipped_when_testing_accepted() {
        let dir = create_test_tree();
        write(dir.path(), "etc/make.conf", "ACCEPT_KEYWORDS=\"~amd64\"\n");
        let domain = create_domain(&dir);
        let llvm = pkg("sys-devel/llvm-17").with_keywords("amd64").with_iuse("+jit");
        assert!(!domain.is_stable(&llvm));

        let state = domain.use_state(&llvm);
        assert_eq!(state.masked, set(&["selinux"]));
        assert_eq!(state.enabled, set(&["jit"]));
    }

    #[test]
    fn test_per_package_testing_keyword_is_not_stable() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let edge = pkg("dev-util/edge-1").with_keywords("amd64").with_iuse("+jit");
        assert!(!domain.is_stable(&edge));
        assert_eq!(domain.use_state(&edge).enabled, set(&["jit"]));

        let stable = pkg("dev-util/foo-1").with_keywords("amd64").with_iuse("+jit");
        assert!(domain.is_stable(&stable));
        assert!(domain.use_state(&stable).enabled.is_empty());
    }

    #[test]
    fn test_unknown_flags_without_iuse() {
        let dir = create_test_tree();
        let domain = create_domain(&dir);
        let state = domain.use_state(&pkg("app-misc/anything-1"));
        assert_eq!(state.enabled, set(&["X", "doc"]));
    }
}

mod configuration {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_domain_from_toml() {
        let dir = create_test_tree();
        let config_path = dir.path().join("resolver.toml");
        write(
            dir.path(),
            "resolver.toml",
            &format!(
                "profile = \"{}\"\nuser_config = \"{}\"\nlicense_groups = \"{}\"\narch = \"arm64\"\n",
                dir.path().join("profiles/leaf").display(),
                dir.path().join("etc").display(),
                dir.path().join("license_groups").display(),
            ),
        );

        let config = ResolverConfig::load(&config_path).unwrap();
        let domain = config.build_domain().unwrap();
        assert_eq!(domain.arch(), Some("arm64"));
        assert_eq!(domain.profile().nodes().count(), 2);
    }

    #[test]
    fn test_user_line_without_flags() {
        let dir = create_test_tree();
        write(dir.path(), "etc/package.use/broken", "app-editors/vim\n");
        let err = UserConfig::load(&dir.path().join("etc")).unwrap_err();
        assert_matches!(err, Error::Config { .. });
    }

    #[test]
    fn test_broken_profile_fails_domain() {
        let dir = create_test_tree();
        write(dir.path(), "profiles/base/package.mask", "=not-an-atom\n");
        let stack =
            ProfileStack::load(&dir.path().join("profiles/leaf"), ProfileOptions::default()).unwrap();
        let err = Domain::new(stack, UserConfig::default(), LicenseGroups::new()).unwrap_err();
        assert_matches!(err, Error::Profile { ref filename, .. } if filename == "package.mask");
    }
}

//! Package resource - install a local package file

use anyhow::{Context, Result};
use converge::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::runner;

/// Name and version recorded inside a package file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

/// Backend answering "is it installed" and installing from a file
pub trait PackageManager: fmt::Debug {
    /// Installed version, or `None` if the package is not installed
    fn installed_version(&self, package: &str) -> Result<Option<String>>;

    /// Package name and version a local file would install
    fn inspect_file(&self, file: &Path) -> Result<PackageInfo>;

    /// Install a package from a local file
    fn install_file(&self, package: &str, file: &Path) -> Result<()>;
}

/// Debian package database via dpkg
#[derive(Debug, Clone)]
pub struct Dpkg {
    root: PathBuf,
}

impl Dpkg {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn admindir(&self) -> PathBuf {
        self.root.join("var/lib/dpkg")
    }
}

/// Parse `dpkg-query -W -f '${Status}\t${Version}'` output
fn parse_status(output: &str) -> Option<String> {
    let (status, version) = output.trim().split_once('\t')?;
    if status.trim() == "install ok installed" {
        Some(version.trim().to_string())
    } else {
        None
    }
}

/// Parse `dpkg-deb -W --showformat '${Package}\t${Version}'` output
fn parse_deb_fields(output: &str) -> Result<PackageInfo> {
    let (name, version) = output
        .trim()
        .split_once('\t')
        .with_context(|| format!("Unexpected dpkg-deb output: {output:?}"))?;
    let (name, version) = (name.trim(), version.trim());
    if name.is_empty() || version.is_empty() {
        anyhow::bail!("Package file lacks a name or version: {output:?}");
    }
    Ok(PackageInfo {
        name: name.to_string(),
        version: version.to_string(),
    })
}

/// dpkg-query exits 1 and says so when the database has never heard of a package
fn is_unknown_package(code: Option<i32>, stderr: &str) -> bool {
    code == Some(1) && stderr.contains("no packages found matching")
}

impl PackageManager for Dpkg {
    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        let admindir = self.admindir();
        if !admindir.is_dir() {
            anyhow::bail!("dpkg database not found at {}", admindir.display());
        }
        let admindir = format!("--admindir={}", admindir.display());
        let args = [admindir.as_str(), "-W", "-f=${Status}\t${Version}", package];

        let output = runner::run_output("dpkg-query", &args)?;
        if output.status.success() {
            return Ok(parse_status(&String::from_utf8_lossy(&output.stdout)));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_unknown_package(output.status.code(), &stderr) {
            log::debug!("dpkg-query {package}: {}", stderr.trim());
            return Ok(None);
        }
        Err(runner::failure("dpkg-query", &args, &output))
    }

    fn inspect_file(&self, file: &Path) -> Result<PackageInfo> {
        let file = file.display().to_string();
        let out = runner::run_capture(
            "dpkg-deb",
            &["-W", "--showformat=${Package}\t${Version}", &file],
        )
        .with_context(|| format!("Failed to read package metadata from {file}"))?;
        parse_deb_fields(&out)
    }

    fn install_file(&self, package: &str, file: &Path) -> Result<()> {
        let root = format!("--root={}", self.root.display());
        let file = file.display().to_string();
        runner::run_checked("dpkg", &[&root, "-i", &file])
            .with_context(|| format!("Failed to install {package} from {file}"))
    }
}

/// A package installed from a local file
#[derive(Debug)]
pub struct Package {
    name: String,
    source: String,
    source_path: PathBuf,
    manager: Rc<dyn PackageManager>,
}

impl Package {
    /// `source` is a node path, `root` resolves it for reading
    pub fn new(root: &Path, name: &str, source: &str, manager: Rc<dyn PackageManager>) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            source_path: super::rooted(root, source),
            manager,
        }
    }
}

impl Resource for Package {
    fn kind(&self) -> &'static str {
        "package"
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Install package {} from {}", self.name, self.source)
    }

    fn current_state(&self) -> Result<ResourceState> {
        // The package file names the real package; before it is in place
        // only the declared name can be asked about
        let (package, wanted) = if self.source_path.exists() {
            let info = self.manager.inspect_file(&self.source_path)?;
            (info.name, Some(info.version))
        } else {
            log::debug!("{} not present yet, probing {}", self.source, self.name);
            (self.name.clone(), None)
        };

        Ok(match self.manager.installed_version(&package)? {
            None => ResourceState::Absent,
            Some(installed) if wanted.as_ref().is_none_or(|w| *w == installed) => {
                ResourceState::present("installed")
            }
            Some(installed) => ResourceState::present(format!("{package} {installed} installed")),
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present("installed")
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        self.manager.install_file(&self.name, &self.source_path)?;
        Ok(ApplyResult::Created)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory package database
    #[derive(Debug, Default)]
    pub(crate) struct FakePackages {
        pub installed: RefCell<HashMap<String, String>>,
        pub installs: RefCell<Vec<PathBuf>>,
    }

    impl PackageManager for FakePackages {
        fn installed_version(&self, package: &str) -> Result<Option<String>> {
            Ok(self.installed.borrow().get(package).cloned())
        }

        /// Debian file naming: `<name>_<version>_<arch>.deb`
        fn inspect_file(&self, file: &Path) -> Result<PackageInfo> {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .context("package file has no name")?;
            let mut parts = stem.split('_');
            Ok(PackageInfo {
                name: parts.next().unwrap_or(stem).to_string(),
                version: parts.next().unwrap_or("0.1.6").to_string(),
            })
        }

        fn install_file(&self, _package: &str, file: &Path) -> Result<()> {
            if !file.exists() {
                anyhow::bail!("{} does not exist", file.display());
            }
            let info = self.inspect_file(file)?;
            self.installs.borrow_mut().push(file.to_path_buf());
            self.installed.borrow_mut().insert(info.name, info.version);
            Ok(())
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status("install ok installed\t0.1.6\n").as_deref(),
            Some("0.1.6")
        );
        assert_eq!(parse_status("deinstall ok config-files\t0.1.5"), None);
        assert_eq!(parse_status(""), None);
    }

    #[test]
    fn test_parse_deb_fields() {
        assert_eq!(
            parse_deb_fields("python-requests-aws\t0.1.6\n").unwrap(),
            PackageInfo {
                name: "python-requests-aws".into(),
                version: "0.1.6".into(),
            }
        );
        assert!(parse_deb_fields("python-requests-aws").is_err());
        assert!(parse_deb_fields("\t0.1.6").is_err());
    }

    #[test]
    fn test_unknown_package_detection() {
        assert!(is_unknown_package(
            Some(1),
            "dpkg-query: no packages found matching requests-aws\n"
        ));
        assert!(!is_unknown_package(
            Some(2),
            "dpkg-query: error: cannot access archive: No such file or directory"
        ));
        assert!(!is_unknown_package(Some(1), "dpkg-query: error: parsing file"));
        assert!(!is_unknown_package(None, ""));
    }

    #[test]
    fn test_missing_package_database_is_an_error() {
        let root = tempfile::TempDir::new().unwrap();
        let err = Dpkg::new(root.path())
            .installed_version("requests-aws")
            .unwrap_err();
        assert!(err.to_string().contains("dpkg database not found"));
    }

    fn deb_root() -> tempfile::TempDir {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("tmp")).unwrap();
        std::fs::write(root.path().join("tmp/python-requests-aws_0.1.6_all.deb"), b"deb").unwrap();
        root
    }

    #[test]
    fn test_probe_uses_name_inside_package_file() {
        let root = deb_root();
        let manager = Rc::new(FakePackages::default());
        manager
            .installed
            .borrow_mut()
            .insert("python-requests-aws".into(), "0.1.6".into());
        let package = Package::new(
            root.path(),
            "requests-aws",
            "/tmp/python-requests-aws_0.1.6_all.deb",
            manager.clone(),
        );

        assert!(!package.needs_apply().unwrap());
        assert!(manager.installs.borrow().is_empty());
    }

    #[test]
    fn test_other_installed_version_reinstalls() {
        let root = deb_root();
        let manager = Rc::new(FakePackages::default());
        manager
            .installed
            .borrow_mut()
            .insert("python-requests-aws".into(), "0.1.5".into());
        let package = Package::new(
            root.path(),
            "requests-aws",
            "/tmp/python-requests-aws_0.1.6_all.deb",
            manager.clone(),
        );

        assert_eq!(
            package.current_state().unwrap(),
            ResourceState::present("python-requests-aws 0.1.5 installed")
        );
        package.apply(&mut ApplyContext::default()).unwrap();
        assert!(!package.needs_apply().unwrap());
    }

    #[test]
    fn test_install_once() {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("tmp")).unwrap();
        std::fs::write(root.path().join("tmp/requests-aws.deb"), b"deb").unwrap();

        let manager = Rc::new(FakePackages::default());
        let package = Package::new(
            root.path(),
            "requests-aws",
            "/tmp/requests-aws.deb",
            manager.clone(),
        );

        assert_eq!(package.current_state().unwrap(), ResourceState::Absent);
        package.apply(&mut ApplyContext::default()).unwrap();
        assert!(!package.needs_apply().unwrap());
        assert_eq!(manager.installs.borrow().len(), 1);
    }

    #[test]
    fn test_missing_package_file_fails() {
        let root = tempfile::TempDir::new().unwrap();
        let package = Package::new(
            root.path(),
            "requests-aws",
            "/tmp/missing.deb",
            Rc::new(FakePackages::default()),
        );
        assert!(package.apply(&mut ApplyContext::default()).is_err());
    }
}

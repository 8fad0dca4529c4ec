//! Directory layout of a VSD workspace.
//!
//! ```text
//! <root>/
//!   boards/<board>/          generated board directory (BOARD_ROOT)
//!   build/<board>/           west build directory
//!   builds/<board>/          kept build outputs and simulator files
//!     .stages/               stage hashes and logs
//!   generated/               generated applications
//!   .locks/<board>.lock
//!   vsd-env.yml
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use vsd_codegen::BoardTarget;

pub const CONFIG_FILE: &str = "vsd-env.yml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (creating if needed) a workspace; the root is made absolute so
    /// every derived path can be handed to external tools as-is.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        Ok(Self {
            root: fs::canonicalize(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn boards_dir(&self) -> PathBuf {
        self.root.join("boards")
    }

    pub fn board_dir(&self, board: &str) -> PathBuf {
        self.boards_dir().join(board)
    }

    pub fn build_dir(&self, board: &str) -> PathBuf {
        self.root.join("build").join(board)
    }

    pub fn builds_dir(&self, board: &str) -> PathBuf {
        self.root.join("builds").join(board)
    }

    pub fn stages_dir(&self, board: &str) -> PathBuf {
        self.builds_dir(board).join(".stages")
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.root.join("generated")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(".locks")
    }

    pub fn board_target(&self, board: &str, resources_dir: &Path, zephyr_base: &Path) -> BoardTarget {
        BoardTarget {
            board_name: board.to_string(),
            boards_dir: self.boards_dir(),
            resources_dir: resources_dir.to_path_buf(),
            zephyr_base: zephyr_base.to_path_buf(),
        }
    }

    /// Every directory that belongs to `board`.
    pub fn board_dirs(&self, board: &str) -> [PathBuf; 3] {
        [self.board_dir(board), self.build_dir(board), self.builds_dir(board)]
    }

    /// Boards with anything in the workspace, sorted.
    pub fn boards(&self) -> io::Result<Vec<String>> {
        let mut names = std::collections::BTreeSet::new();
        for dir in [self.boards_dir(), self.root.join("build"), self.root.join("builds")] {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    names.insert(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        Ok(names.into_iter().collect())
    }
}

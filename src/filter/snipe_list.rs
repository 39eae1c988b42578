//! Allow-list of mints to buy without running the filter pipeline

use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct SnipeList {
    mints: HashSet<Pubkey>,
}

impl SnipeList {
    /// Load one base58 mint per line. Blank lines and `#` comments are skipped,
    /// unparseable lines are logged and ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read snipe list {}: {}", path.display(), e))
        })?;

        let list = Self::parse(&content);
        info!("Loaded {} mints from snipe list {}", list.len(), path.display());
        Ok(list)
    }

    pub fn parse(content: &str) -> Self {
        let mut mints = HashSet::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            match Pubkey::from_str(line) {
                Ok(mint) => {
                    mints.insert(mint);
                }
                Err(e) => warn!("Skipping snipe list line {}: {} ({})", line_no + 1, line, e),
            }
        }
        Self { mints }
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.mints.contains(mint)
    }

    pub fn len(&self) -> usize {
        self.mints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mints.is_empty()
    }
}

impl FromIterator<Pubkey> for SnipeList {
    fn from_iter<T: IntoIterator<Item = Pubkey>>(iter: T) -> Self {
        Self {
            mints: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_garbage() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let content = format!("# watched mints\n{}\n\n  {}  # launch at noon\nnot-a-mint\n", a, b);

        let list = SnipeList::parse(&content);
        assert_eq!(list.len(), 2);
        assert!(list.contains(&a));
        assert!(list.contains(&b));
        assert!(!list.contains(&Pubkey::new_unique()));
    }

    #[test]
    fn test_load_from_file() {
        let mint = Pubkey::new_unique();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, format!("{}\n", mint).as_bytes()).unwrap();

        let list = SnipeList::load(file.path()).unwrap();
        assert!(list.contains(&mint));

        assert!(SnipeList::load(Path::new("/nonexistent/snipe-list.txt")).is_err());
    }
}

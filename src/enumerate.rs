//! 디렉터리 열거
//!
//! 루트 아래의 일반 파일을 깊이 우선으로 모두 수집한다.
//! 읽을 수 없는 하위 항목은 로그를 남기고 건너뛴다.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{Error, Result};

/// 전송 대상 파일 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// 로컬 파일 경로
    pub absolute_path: PathBuf,

    /// 와이어에 실리는 이름 (`<루트 라벨>/<상대 경로>`)
    pub name: String,

    /// 파일 크기 (바이트)
    pub size: u64,

    /// 일반 파일 여부
    pub is_regular: bool,
}

/// 루트 디렉터리 아래 모든 일반 파일 열거
///
/// 루트 자체를 stat 할 수 없거나 디렉터리가 아니면 에러를 반환한다.
pub fn enumerate(root: &Path) -> Result<Vec<FileDescriptor>> {
    let metadata = std::fs::metadata(root).map_err(|source| Error::Enumeration {
        path: root.to_path_buf(),
        source,
    })?;

    if !metadata.is_dir() {
        return Err(Error::Enumeration {
            path: root.to_path_buf(),
            source: io::Error::other("디렉터리가 아님"),
        });
    }

    let label = root_label(root);
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                // 읽기 실패한 디렉터리는 walkdir가 하위 트리째 건너뜀
                warn!("항목 열거 실패, 건너뜀: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("파일 정보 조회 실패 {:?}: {}", entry.path(), e);
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(root).ok().and_then(wire_relative) {
            Some(r) => r,
            None => {
                warn!("UTF-8 이 아닌 경로, 건너뜀: {:?}", entry.path());
                continue;
            }
        };

        files.push(FileDescriptor {
            absolute_path: entry.path().to_path_buf(),
            name: format!("{}/{}", label, relative),
            size,
            is_regular: true,
        });
    }

    debug!("{:?} 아래 파일 {}개 열거", root, files.len());
    Ok(files)
}

/// 루트의 마지막 일반 컴포넌트, 없으면 "."
fn root_label(root: &Path) -> String {
    match root.components().next_back() {
        Some(Component::Normal(name)) => name.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    }
}

/// 상대 경로를 '/' 구분 문자열로 변환
fn wire_relative(relative: &Path) -> Option<String> {
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

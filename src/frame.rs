//! 프레임 코덱
//!
//! 와이어 포맷:
//! ```text
//! +----------------+------------------+-------------------------+
//! | path_len (u32) | path (UTF-8)     | 파일 내용 (스트림 끝까지) |
//! | little-endian  | path_len 바이트   |                         |
//! +----------------+------------------+-------------------------+
//! ```
//! 본문 길이 필드는 없으므로 송신측은 마지막 바이트 뒤에 스트림을 정확히 한 번 닫아야 한다.

use std::path::{Component, Path};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{FileDescriptor, FrameError, LENGTH_PREFIX_SIZE};

/// 파일 정보로 프레임 헤더 생성
pub fn encode(descriptor: &FileDescriptor) -> Result<Bytes, FrameError> {
    encode_header(&descriptor.name)
}

/// 경로로 프레임 헤더(길이 + 경로) 생성
pub fn encode_header(path: &str) -> Result<Bytes, FrameError> {
    let len = u32::try_from(path.len()).map_err(|_| FrameError::PathTooLong {
        len: path.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + path.len());
    buf.put_u32_le(len);
    buf.put_slice(path.as_bytes());
    Ok(buf.freeze())
}

/// 스트림에서 프레임 헤더를 읽어 상대 경로 반환
///
/// 성공하면 스트림은 파일 내용 첫 바이트에 위치한다.
pub async fn read_header<R>(reader: &mut R, max_path_len: usize) -> Result<String, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(FrameError::ShortLength)?;

    let len = u32::from_le_bytes(prefix) as usize;
    if len > max_path_len {
        return Err(FrameError::PathTooLong {
            len,
            max: max_path_len,
        });
    }

    let mut path = vec![0u8; len];
    reader
        .read_exact(&mut path)
        .await
        .map_err(|source| FrameError::ShortPath {
            expected: len,
            source,
        })?;

    String::from_utf8(path).map_err(|_| FrameError::InvalidUtf8)
}

/// 마지막 '/' 기준으로 (디렉터리, 파일 이름) 분리
///
/// 절대 경로, `..` 포함 경로, 빈 파일 이름은 거부한다.
pub fn split_target(path: &str) -> Result<(&str, &str), FrameError> {
    let idx = path
        .rfind('/')
        .ok_or_else(|| FrameError::MissingSeparator(path.to_string()))?;
    let (dir, file_name) = (&path[..idx], &path[idx + 1..]);

    if file_name.is_empty() {
        return Err(FrameError::UnsafePath(path.to_string()));
    }

    let safe = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(FrameError::UnsafePath(path.to_string()));
    }

    Ok((dir, file_name))
}

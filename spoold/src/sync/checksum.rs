use std::io;
use std::path::Path;

use md5::Context;
use tokio::io::AsyncReadExt;

const BUF_SIZE: usize = 64 * 1024;

/// MD5 of the file's full byte stream, lowercase hex.
pub async fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut ctx = Context::new();
    let mut buf = vec![0u8; BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }

    Ok(format!("{:x}", ctx.compute()))
}

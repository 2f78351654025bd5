use crate::error::Error;
use boring::error::ErrorStack;
use boring::pkey::{PKey, Private};
use boring::ssl::{SslContextBuilder, SslVersion};
use boring::x509::X509;
use libc::c_int;
use std::collections::VecDeque;
use std::ffi::CString;
use std::io;
use std::path::Path;
use std::ptr;
use truststore_common::TlsVersion;

fn cvt(r: c_int) -> Result<c_int, ErrorStack> {
    if r <= 0 {
        Err(ErrorStack::get())
    } else {
        Ok(r)
    }
}

/// Adds a hashed certificate directory to the verify store. boring only
/// wraps the file half of `SSL_CTX_load_verify_locations`.
pub fn load_verify_dir(builder: &mut SslContextBuilder, dir: &Path) -> Result<(), Error> {
    let dir = path_to_cstring(dir)?;
    unsafe {
        cvt(boring_sys::SSL_CTX_load_verify_locations(
            builder.as_ptr(),
            ptr::null(),
            dir.as_ptr(),
        ))?;
    }
    Ok(())
}

fn path_to_cstring(path: &Path) -> Result<CString, Error> {
    path.to_str()
        .and_then(|p| CString::new(p).ok())
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable CA path {}", path.display()),
            ))
        })
}

pub fn ssl_version(version: TlsVersion) -> SslVersion {
    match version {
        TlsVersion::Tls10 => SslVersion::TLS1,
        TlsVersion::Tls11 => SslVersion::TLS1_1,
        TlsVersion::Tls12 => SslVersion::TLS1_2,
        TlsVersion::Tls13 => SslVersion::TLS1_3,
    }
}

pub fn parse_certs(bs: &[u8]) -> io::Result<VecDeque<X509>> {
    let tls_cert = X509::stack_from_pem(bs)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid cert"))?;
    if tls_cert.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid cert"));
    }
    Ok(VecDeque::from(tls_cert))
}

pub fn parse_keys(bs: &[u8]) -> io::Result<PKey<Private>> {
    if let Ok(result) = PKey::private_key_from_pem(bs) {
        return Ok(result);
    }
    PKey::private_key_from_pkcs8(bs)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid key"))
}

//! Where a package's content comes from.

use crate::fetch::RemoteFetcher;
use pkgr_core::{ApplyRequest, Encoding, Package, PackageParser, ParseError, PkgError, ValidationErr};
use serde_json::Value;

/// Produce the package named by `request`.
///
/// A remote with a URL wins over the inline payload and is decoded with its
/// own encoding; the inline payload is decoded with `encoding`, the one
/// resolved from the request headers.
pub async fn resolve_package(
    request: &ApplyRequest,
    encoding: Encoding,
    parser: &PackageParser,
    fetcher: &dyn RemoteFetcher,
) -> Result<Package, PkgError> {
    if request.remote.is_set() {
        let remote_encoding = request.remote.encoding();
        tracing::debug!(
            url = %request.remote.url,
            encoding = %remote_encoding,
            "Resolving package from remote"
        );
        let bytes = fetcher.fetch(&request.remote.url).await?;
        return Ok(parser.parse(remote_encoding, &bytes)?);
    }

    match &request.raw_package {
        Some(Value::String(text)) => Ok(parser.parse(encoding, text.as_bytes())?),
        Some(value) => Ok(parser.parse_value(value.clone())?),
        None => Err(ParseError::single(
            ValidationErr::new("no package provided: set either remote.url or package")
                .field("package"),
        )
        .into()),
    }
}

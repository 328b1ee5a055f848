//! `RT_MANIFEST` - side-by-side assembly manifest (XML).

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssemblyIdentity {
    pub name: String,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub processor_architecture: Option<String>,
    pub public_key_token: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssemblyManifest {
    pub manifest_version: Option<String>,
    pub identity: Option<AssemblyIdentity>,
    pub description: Option<String>,
    pub dependencies: Vec<AssemblyIdentity>,
    /// `file` element names.
    pub files: Vec<String>,
    /// `requestedExecutionLevel` level, e.g. `asInvoker`.
    pub execution_level: Option<String>,
    pub ui_access: Option<bool>,
    pub dpi_aware: Option<String>,
    /// `supportedOS` GUIDs.
    pub supported_os: Vec<String>,
}

fn identity(e: &BytesStart<'_>) -> Result<AssemblyIdentity> {
    let mut id = AssemblyIdentity::default();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.local_name().as_ref() {
            b"name" => id.name = value,
            b"version" => id.version = Some(value),
            b"type" => id.kind = Some(value),
            b"processorArchitecture" => id.processor_architecture = Some(value),
            b"publicKeyToken" => id.public_key_token = Some(value),
            b"language" => id.language = Some(value),
            _ => {}
        }
    }
    Ok(id)
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

impl AssemblyManifest {
    /// Parse manifest bytes. A UTF-8 BOM and trailing padding are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::Parse("manifest is not UTF-8"))?
            .trim_end_matches(['\0', ' ', '\r', '\n']);

        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut manifest = Self::default();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut saw_root = false;
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf)?;
            let (e, empty) = match &event {
                Event::Start(e) => (Some(e), false),
                Event::Empty(e) => (Some(e), true),
                _ => (None, false),
            };

            if let Some(e) = e {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"assembly" => {
                        saw_root = true;
                        manifest.manifest_version = attribute(e, b"manifestVersion")?;
                    }
                    b"assemblyIdentity" => {
                        let id = identity(e)?;
                        if stack.iter().any(|n| n == b"dependentAssembly") {
                            manifest.dependencies.push(id);
                        } else {
                            manifest.identity = Some(id);
                        }
                    }
                    b"file" => {
                        if let Some(name) = attribute(e, b"name")? {
                            manifest.files.push(name);
                        }
                    }
                    b"requestedExecutionLevel" => {
                        manifest.execution_level = attribute(e, b"level")?;
                        manifest.ui_access = attribute(e, b"uiAccess")?
                            .map(|v| v.eq_ignore_ascii_case("true"));
                    }
                    b"supportedOS" => {
                        if let Some(id) = attribute(e, b"Id")? {
                            manifest.supported_os.push(id);
                        }
                    }
                    _ => {}
                }
                if !empty {
                    stack.push(name);
                }
            }

            match event {
                Event::Text(t) => {
                    let value = t.unescape()?.into_owned();
                    match stack.last().map(Vec::as_slice) {
                        Some(b"description") => manifest.description = Some(value),
                        Some(b"dpiAware") => manifest.dpi_aware = Some(value),
                        _ => {}
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(Error::Parse("manifest has no assembly element"));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity name="Valve.Hammer" version="4.0.0.0" type="win32" processorArchitecture="x86"/>
  <description>Level &amp; map editor</description>
  <dependency>
    <dependentAssembly>
      <assemblyIdentity type="win32" name="Microsoft.Windows.Common-Controls" version="6.0.0.0" publicKeyToken="6595b64144ccf1df" language="*"/>
    </dependentAssembly>
  </dependency>
  <file name="hammer.dll" hashalg="SHA1"/>
  <trustInfo xmlns="urn:schemas-microsoft-com:asm.v3">
    <security>
      <requestedPrivileges>
        <requestedExecutionLevel level="asInvoker" uiAccess="false"/>
      </requestedPrivileges>
    </security>
  </trustInfo>
  <compatibility xmlns="urn:schemas-microsoft-com:compatibility.v1">
    <application>
      <supportedOS Id="{35138b9a-5d96-4fbd-8e2d-a2440225f93a}"/>
    </application>
  </compatibility>
</assembly>
"#;

    #[test]
    fn typical_manifest() {
        let mut data = b"\xEF\xBB\xBF".to_vec();
        data.extend_from_slice(SAMPLE.as_bytes());
        data.extend_from_slice(&[0, 0]);

        let m = AssemblyManifest::parse(&data).unwrap();
        assert_eq!(m.manifest_version.as_deref(), Some("1.0"));
        assert_eq!(m.identity.as_ref().unwrap().name, "Valve.Hammer");
        assert_eq!(m.description.as_deref(), Some("Level & map editor"));
        assert_eq!(m.dependencies.len(), 1);
        assert_eq!(
            m.dependencies[0].public_key_token.as_deref(),
            Some("6595b64144ccf1df")
        );
        assert_eq!(m.files, vec!["hammer.dll".to_owned()]);
        assert_eq!(m.execution_level.as_deref(), Some("asInvoker"));
        assert_eq!(m.ui_access, Some(false));
        assert_eq!(m.supported_os.len(), 1);
    }

    #[test]
    fn not_a_manifest() {
        assert!(AssemblyManifest::parse(b"<html></html>").is_err());
        assert!(AssemblyManifest::parse(&[0xFF, 0xFE]).is_err());
    }
}

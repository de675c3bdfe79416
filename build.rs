fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .emit_rerun_if_changed(false)
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .field_attribute(
            ".catalog.Memory.unit",
            r#"#[serde(with = "crate::serializer::enum_names::memory_unit")]"#,
        )
        .field_attribute(
            ".catalog.Storage.driver",
            r#"#[serde(with = "crate::serializer::enum_names::storage_driver")]"#,
        )
        .field_attribute(
            ".catalog.Screen.panel",
            r#"#[serde(with = "crate::serializer::enum_names::screen_panel")]"#,
        )
        .field_attribute(
            ".catalog.Keyboard.layout",
            r#"#[serde(with = "crate::serializer::enum_names::keyboard_layout")]"#,
        )
        .compile_protos(
            &[
                "proto/laptop.proto",
                "proto/laptop_service.proto",
                "proto/auth_service.proto",
            ],
            &["proto"],
        )?;

    println!("cargo:rerun-if-changed=proto");
    Ok(())
}

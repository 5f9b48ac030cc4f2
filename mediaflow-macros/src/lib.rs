use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod stage_meta;
use stage_meta::{parse_params, parse_slots, parse_stage_info, SlotField};

/// Registers a stage kind with the `mediaflow` registry.
///
/// The struct must implement `Stage`, `Default` and `serde::Deserialize`;
/// its `#[param]` fields are filled from the stage's config params.
#[proc_macro_derive(StageKind, attributes(stage_meta, param, input, output))]
pub fn derive_stage_kind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let stage_info = match parse_stage_info(&input) {
        Ok(info) => info,
        Err(e) => return e.write_errors().into(),
    };

    let params = parse_params(&input);
    let (inputs, outputs) = parse_slots(&input);

    let struct_name = &input.ident;
    let lowered = struct_name.to_string().to_lowercase();
    let kind = stage_info.kind.clone().unwrap_or_else(|| lowered.clone());
    let stage_name = &stage_info.name;
    let category = &stage_info.category;

    let param_schemas = params.iter().filter_map(|p| {
        let field_name = p.ident.as_ref()?.to_string();
        let default_val = p.default.as_ref()?.as_str();
        let type_name = extract_type_name(&p.ty);

        let min = match p.min {
            Some(min) => quote! { Some(#min) },
            None => quote! { None },
        };
        let max = match p.max {
            Some(max) => quote! { Some(#max) },
            None => quote! { None },
        };

        Some(quote! {
            crate::registry::ParameterSchema {
                name: #field_name.to_string(),
                param_type: #type_name.to_string(),
                default: serde_json::from_str(#default_val)
                    .unwrap_or_else(|_| serde_json::Value::String(#default_val.to_string())),
                min: #min,
                max: #max,
            }
        })
    });

    let input_metas = inputs.iter().filter_map(slot_metadata);
    let output_metas = outputs.iter().filter_map(slot_metadata);

    let mod_name = syn::Ident::new(
        &format!("__stage_registration_{}", lowered),
        struct_name.span(),
    );

    let factory_fn_name = syn::Ident::new(
        &format!("create_descriptor_{}", lowered),
        struct_name.span(),
    );

    let expanded = quote! {
        mod #mod_name {
            use super::*;

            fn #factory_fn_name() -> crate::registry::StageDescriptor {
                crate::registry::StageDescriptor {
                    kind: #kind.to_string(),
                    name: #stage_name.to_string(),
                    category: #category.to_string(),
                    inputs: vec![#(#input_metas),*],
                    outputs: vec![#(#output_metas),*],
                    parameters: vec![#(#param_schemas),*],
                    factory: |params: &serde_json::Value| -> anyhow::Result<Box<dyn crate::stage::Stage>> {
                        let stage: #struct_name = crate::registry::decode_params(params)?;
                        Ok(Box::new(stage) as Box<dyn crate::stage::Stage>)
                    },
                }
            }

            ::inventory::submit! {
                crate::registry::StageDescriptorFactoryWrapper(#factory_fn_name)
            }
        }
    };

    TokenStream::from(expanded)
}

fn slot_metadata(slot: &SlotField) -> Option<proc_macro2::TokenStream> {
    let ident = slot.ident.as_ref()?.to_string();
    let slot_id = ident.trim_start_matches('_').to_string();
    let slot_name = slot.name.clone().unwrap_or_else(|| slot_id.clone());
    let media_type = slot.media_type.as_deref().unwrap_or("any");

    Some(quote! {
        crate::registry::SlotMetadata {
            id: #slot_id.to_string(),
            name: #slot_name.to_string(),
            media_type: #media_type.to_string(),
        }
    })
}

fn extract_type_name(ty: &syn::Type) -> &'static str {
    let type_str = quote!(#ty).to_string();

    if type_str.contains("f64") || type_str.contains("f32") {
        "number"
    } else if type_str.contains("u32") || type_str.contains("i32")
        || type_str.contains("u64") || type_str.contains("i64")
        || type_str.contains("usize") || type_str.contains("isize") {
        "number"
    } else if type_str.contains("String") || type_str.contains("str") {
        "string"
    } else if type_str.contains("bool") {
        "boolean"
    } else {
        "enum"
    }
}

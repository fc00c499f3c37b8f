use darling::ast::NestedMeta;
use darling::Error;
use quote::quote;
use syn::{parse_macro_input, Fields, ItemStruct};

use proc_macro::TokenStream;

/// Implements `Mp4Box` for a fixed-layout box struct.
///
/// The generated `write_into` frames the struct's big-endian field
/// serialization as one ISO BMFF box: a u32 size placeholder, the
/// four-character code, the fields in declaration order, then the size
/// patched once the content length is known. The code itself is checked
/// at expansion time.
#[proc_macro_attribute]
pub fn mp4_box(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };

    let fourcc = match args.first() {
        Some(NestedMeta::Lit(syn::Lit::ByteStr(bs))) => bs.value(),
        _ => panic!("mp4_box expects a byte string, e.g. b\"mvhd\""),
    };

    if fourcc.len() != 4 {
        return TokenStream::from(
            syn::Error::new_spanned(&args[0], "mp4_box expects a four-character code")
                .to_compile_error(),
        );
    }
    // ISO 14496-12 codes are printable ASCII ("url " carries a space).
    if fourcc.iter().any(|&b| !(0x20..=0x7E).contains(&b)) {
        return TokenStream::from(
            syn::Error::new_spanned(&args[0], "mp4_box code must be printable ASCII")
                .to_compile_error(),
        );
    }
    let fourcc_tokens = {
        let b = fourcc;
        quote! {[#(#b),*]}
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let fields: Vec<syn::Member> = match &input.fields {
        Fields::Named(nf) => nf
            .named
            .iter()
            .map(|f| f.ident.clone().unwrap().into())
            .collect(),
        Fields::Unnamed(uf) => uf
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, _)| syn::Index::from(i).into())
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let expanded = quote! {
        #input

        impl Mp4Box for #name {
            fn fourcc(&self) -> &[u8; 4] {
                const BYTES: [u8; 4] = #fourcc_tokens;
                &BYTES
            }

            fn write_into(&self, dst: &mut Vec<u8>) {
                let size_index = dst.len();
                dst.extend_from_slice(&[0u8; 4]);
                dst.extend_from_slice(self.fourcc());
                #( crate::byteorder::WriteBytesBe::write_be(&self.#fields, dst); )*
                let size = (dst.len() - size_index) as u32;
                dst[size_index..size_index + 4].copy_from_slice(&size.to_be_bytes());
            }
        }
    };
    TokenStream::from(expanded)
}

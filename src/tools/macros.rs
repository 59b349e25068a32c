//! Tool Definition Macros
//!
//! Simplifies tool metadata by reducing boilerplate

/// Build [`ToolMetadata`](crate::tools::ToolMetadata) from a compact declaration.
///
/// Each parameter is `name: type [= [choices]] [@required] => "description"`.
///
/// # Example
/// ```
/// let metadata = rxmesh::tool_metadata!("escalate_to_human", "Escalate the conversation to a human agent", {
///     reason: string @required => "Reason for escalation",
///     priority: string = ["low", "normal", "high", "urgent"] => "Escalation priority",
/// });
/// assert_eq!(metadata.parameters.len(), 2);
/// ```
#[macro_export]
macro_rules! tool_metadata {
    (@required required) => {
        true
    };
    (@required) => {
        false
    };
    (@choices [$($choice:literal),+]) => {
        Some(vec![$($choice.to_string()),+])
    };
    (@choices) => {
        None
    };
    (
        $name:literal, $description:literal, {
            $(
                $param:ident : $ty:ident
                $(= [$($choice:literal),+ $(,)?])?
                $(@ $req:ident)?
                => $doc:literal
            ),* $(,)?
        }
    ) => {
        $crate::tools::ToolMetadata {
            name: $name.to_string(),
            description: $description.to_string(),
            parameters: vec![
                $(
                    $crate::tools::ToolParameter {
                        name: stringify!($param).to_string(),
                        param_type: stringify!($ty).to_string(),
                        description: $doc.to_string(),
                        required: $crate::tool_metadata!(@required $($req)?),
                        enum_values: $crate::tool_metadata!(@choices $([$($choice),+])?),
                    }
                ),*
            ],
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_tool_metadata_macro() {
        let metadata = tool_metadata!("get_shipping_info", "Get shipping information and policies", {
            topic: string = ["rates", "time", "policy"] => "Shipping topic",
            order_number: string @required => "The order number",
            limit: integer => "Maximum results",
        });

        assert_eq!(metadata.name, "get_shipping_info");
        assert_eq!(metadata.parameters.len(), 3);
        assert_eq!(metadata.parameters[0].name, "topic");
        assert!(!metadata.parameters[0].required);
        assert_eq!(
            metadata.parameters[0].enum_values.as_deref(),
            Some(&["rates".to_string(), "time".to_string(), "policy".to_string()][..])
        );
        assert!(metadata.parameters[1].required);
        assert_eq!(metadata.parameters[2].param_type, "integer");
        assert!(metadata.parameters[2].enum_values.is_none());
    }

    #[test]
    fn test_tool_metadata_without_parameters() {
        let metadata = tool_metadata!("ping", "No arguments", {});
        assert!(metadata.parameters.is_empty());
    }
}

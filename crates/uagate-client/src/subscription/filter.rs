// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Event filters for event monitored items.
//!
//! Select clauses pick event fields; where clauses restrict which events are
//! reported. Only `OfType` and `InView` where-elements are supported, each
//! with exactly one node-id operand. Requests using anything else are
//! rejected per clause when the filter is built, and the remaining clauses
//! still apply.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ClientError, ClientResult};
use crate::types::{AttributeId, ExpandedNodeId, NamespaceTable, NodeId, QualifiedName};

// =============================================================================
// Request types
// =============================================================================

/// A select clause as supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectClauseRequest {
    /// Attribute name or numeric ID.
    pub attribute_id: String,
    /// Optional index range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_range: Option<String>,
    /// Event type definition, plain or namespace-URI qualified.
    pub type_id: String,
    /// Browse path below the type definition (`2:Name` or `Name`).
    #[serde(default)]
    pub browse_paths: Vec<String>,
}

/// A where-clause element as supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereClauseRequest {
    /// Operator name, e.g. `OfType`.
    pub operator: String,
    /// Operands as node id strings.
    #[serde(default)]
    pub operands: Vec<String>,
}

// =============================================================================
// FilterOperator
// =============================================================================

/// Content filter operators known to the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Equals.
    Equals,
    /// IsNull.
    IsNull,
    /// GreaterThan.
    GreaterThan,
    /// LessThan.
    LessThan,
    /// GreaterThanOrEqual.
    GreaterThanOrEqual,
    /// LessThanOrEqual.
    LessThanOrEqual,
    /// Like.
    Like,
    /// Not.
    Not,
    /// Between.
    Between,
    /// InList.
    InList,
    /// And.
    And,
    /// Or.
    Or,
    /// Cast.
    Cast,
    /// InView.
    InView,
    /// OfType.
    OfType,
    /// RelatedTo.
    RelatedTo,
    /// BitwiseAnd.
    BitwiseAnd,
    /// BitwiseOr.
    BitwiseOr,
}

impl FilterOperator {
    const ALL: [Self; 18] = [
        Self::Equals,
        Self::IsNull,
        Self::GreaterThan,
        Self::LessThan,
        Self::GreaterThanOrEqual,
        Self::LessThanOrEqual,
        Self::Like,
        Self::Not,
        Self::Between,
        Self::InList,
        Self::And,
        Self::Or,
        Self::Cast,
        Self::InView,
        Self::OfType,
        Self::RelatedTo,
        Self::BitwiseAnd,
        Self::BitwiseOr,
    ];

    /// Returns the operator name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "Equals",
            Self::IsNull => "IsNull",
            Self::GreaterThan => "GreaterThan",
            Self::LessThan => "LessThan",
            Self::GreaterThanOrEqual => "GreaterThanOrEqual",
            Self::LessThanOrEqual => "LessThanOrEqual",
            Self::Like => "Like",
            Self::Not => "Not",
            Self::Between => "Between",
            Self::InList => "InList",
            Self::And => "And",
            Self::Or => "Or",
            Self::Cast => "Cast",
            Self::InView => "InView",
            Self::OfType => "OfType",
            Self::RelatedTo => "RelatedTo",
            Self::BitwiseAnd => "BitwiseAnd",
            Self::BitwiseOr => "BitwiseOr",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = FilterClauseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| FilterClauseError::UnknownOperator(s.to_string()))
    }
}

// =============================================================================
// Filter clauses
// =============================================================================

/// Per-clause rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterClauseError {
    /// Operator name is not a protocol operator.
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    /// Operator exists but is not supported.
    #[error("filter operator {0} is not supported")]
    UnsupportedOperator(FilterOperator),

    /// Wrong number of operands.
    #[error("filter operator {operator} requires {expected} operand(s), got {actual}")]
    OperandCount {
        /// The operator.
        operator: FilterOperator,
        /// Required count.
        expected: usize,
        /// Supplied count.
        actual: usize,
    },

    /// Operand could not be resolved to a node id.
    #[error("invalid operand '{operand}': {message}")]
    InvalidOperand {
        /// The operand text.
        operand: String,
        /// Failure description.
        message: String,
    },
}

/// A resolved select clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectClause {
    /// Selected attribute.
    pub attribute_id: AttributeId,
    /// Optional index range.
    pub index_range: Option<String>,
    /// Event type definition.
    pub type_definition_id: NodeId,
    /// Browse path below the type definition.
    pub browse_path: Vec<QualifiedName>,
}

impl SelectClause {
    /// Resolves a select request against a namespace table.
    pub fn resolve(request: &SelectClauseRequest, namespaces: &NamespaceTable) -> ClientResult<Self> {
        let attribute_id = request.attribute_id.parse()?;
        let type_id: ExpandedNodeId = request.type_id.parse()?;
        let type_definition_id = namespaces.resolve(&type_id)?;
        let browse_path = request
            .browse_paths
            .iter()
            .map(|p| p.parse())
            .collect::<ClientResult<Vec<QualifiedName>>>()?;

        Ok(Self {
            attribute_id,
            index_range: request.index_range.clone().filter(|r| !r.is_empty()),
            type_definition_id,
            browse_path,
        })
    }
}

/// A supported where-clause element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhereClause {
    /// Events whose type is, or derives from, the given type.
    OfType(NodeId),
    /// Events from nodes within the given view.
    InView(NodeId),
}

impl WhereClause {
    /// Validates an operator and its operands into a supported element.
    pub fn try_new(operator: FilterOperator, operands: Vec<NodeId>) -> Result<Self, FilterClauseError> {
        let build: fn(NodeId) -> Self = match operator {
            FilterOperator::OfType => Self::OfType,
            FilterOperator::InView => Self::InView,
            other => return Err(FilterClauseError::UnsupportedOperator(other)),
        };

        let actual = operands.len();
        let mut operands = operands.into_iter();
        match (operands.next(), operands.next()) {
            (Some(operand), None) => Ok(build(operand)),
            _ => Err(FilterClauseError::OperandCount {
                operator,
                expected: 1,
                actual,
            }),
        }
    }

    /// Resolves a where request against a namespace table.
    pub fn resolve(
        request: &WhereClauseRequest,
        namespaces: &NamespaceTable,
    ) -> Result<Self, FilterClauseError> {
        let operator: FilterOperator = request.operator.parse()?;
        if !matches!(operator, FilterOperator::OfType | FilterOperator::InView) {
            return Err(FilterClauseError::UnsupportedOperator(operator));
        }

        let operands = request
            .operands
            .iter()
            .map(|operand| {
                operand
                    .parse::<ExpandedNodeId>()
                    .and_then(|expanded| namespaces.resolve(&expanded))
                    .map_err(|e| FilterClauseError::InvalidOperand {
                        operand: operand.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::try_new(operator, operands)
    }

    /// Returns the operator of this element.
    pub fn operator(&self) -> FilterOperator {
        match self {
            Self::OfType(_) => FilterOperator::OfType,
            Self::InView(_) => FilterOperator::InView,
        }
    }

    /// Returns the single operand.
    pub fn operand(&self) -> &NodeId {
        match self {
            Self::OfType(id) | Self::InView(id) => id,
        }
    }
}

// =============================================================================
// EventFilter
// =============================================================================

/// A validated event filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Selected event fields, in request order.
    pub select_clauses: Vec<SelectClause>,
    /// Where-clause elements, in request order.
    pub where_clause: Vec<WhereClause>,
}

/// A filter together with the where-clauses that were dropped.
#[derive(Debug, Clone, Default)]
pub struct FilterBuild {
    /// The filter, `None` when the request had no select clauses.
    pub filter: Option<EventFilter>,
    /// Rejected where-clauses as `(request index, reason)`.
    pub rejected: Vec<(usize, FilterClauseError)>,
}

impl EventFilter {
    /// Builds a filter from request clauses.
    ///
    /// Select clauses must all resolve; a failure there fails the build.
    /// Where-clauses are validated one by one and rejected individually.
    /// Without select clauses the item is a plain data-change item and
    /// where-clauses are ignored.
    pub fn build(
        select: &[SelectClauseRequest],
        where_clauses: &[WhereClauseRequest],
        namespaces: &NamespaceTable,
    ) -> ClientResult<FilterBuild> {
        if select.is_empty() {
            return Ok(FilterBuild::default());
        }

        let select_clauses = select
            .iter()
            .map(|clause| SelectClause::resolve(clause, namespaces))
            .collect::<ClientResult<Vec<_>>>()?;

        let mut where_clause = Vec::with_capacity(where_clauses.len());
        let mut rejected = Vec::new();
        for (idx, request) in where_clauses.iter().enumerate() {
            match WhereClause::resolve(request, namespaces) {
                Ok(element) => where_clause.push(element),
                Err(reason) => rejected.push((idx, reason)),
            }
        }

        Ok(FilterBuild {
            filter: Some(Self {
                select_clauses,
                where_clause,
            }),
            rejected,
        })
    }
}

impl From<FilterClauseError> for ClientError {
    fn from(error: FilterClauseError) -> Self {
        ClientError::configuration("where clause", error.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
